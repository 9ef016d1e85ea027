//! Event-handler registry.
//!
//! Independent subsystems register named, priority-ordered lists of
//! callbacks for system events, then add, remove and dispatch them from any
//! thread, including removing a handler while another thread is walking the
//! same list.
//!
//! - **[`registry`]** -- Name → list directory ([`Registry`]) backed by
//!   [`dashmap::DashMap`], with a process-wide default instance.
//! - **[`list`]** -- [`HandlerList`]: priority-ordered entries, per-list
//!   lock, run count and the drain-before-free protocol.
//! - **[`dispatch`]** -- [`DispatchPass`]: the RAII run-count bracket around
//!   one walk over a list.
//! - **[`entry`]** -- [`Entry`], [`HandlerTag`] and the reserved
//!   [`DEAD_PRIORITY`].
//! - **[`context`]** -- The [`Handler`] capability and [`HandlerContext`].
//! - **[`config`]** -- [`RegistryConfig`] capacity limits (TOML + env).
//! - **[`error`]** -- [`RegistryError`] via [`thiserror`].
//!
//! # Guarantees
//!
//! - Within a list, handlers run in ascending priority; equal priorities run
//!   in registration order.
//! - When [`HandlerList::deregister`] returns, no dispatch pass that could
//!   invoke the removed handler is still running.
//! - Lists are independent: one list's lock never blocks another's.
//!
//! Caller bugs (oversized names, registering at [`DEAD_PRIORITY`],
//! destroying a registry that still has handlers) panic.  Capacity and
//! allocation failures are returned as [`RegistryError`].
//!
//! All public types are `Send + Sync`.

pub mod config;
pub mod context;
pub mod dispatch;
pub mod entry;
pub mod error;
pub mod list;
pub mod registry;

// Re-export the most commonly used types at the crate root for convenience.
pub use config::RegistryConfig;
pub use context::{Handler, HandlerContext};
pub use dispatch::DispatchPass;
pub use entry::{DEAD_PRIORITY, Entry, HandlerInfo, HandlerTag};
pub use error::{RegistryError, Result};
pub use list::{HandlerList, ListInfo, LockedList, MAX_NAME_LEN};
pub use registry::Registry;
