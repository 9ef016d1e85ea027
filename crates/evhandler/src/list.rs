//! Named, priority-ordered handler lists.
//!
//! A [`HandlerList`] holds the entries registered for one event name, in
//! ascending priority order with ties kept in registration order.  Each list
//! carries its own lock, independent of the registry directory and of every
//! other list, plus a *run count* of dispatch passes currently walking it.
//!
//! # Drain protocol
//!
//! ```text
//! deregister(tag)                       DispatchPass
//!   lock                                  lock; run_count += 1; snapshot; unlock
//!   run_count == 0 ? unlink               ... invoke live entries ...
//!                  : retire (stay linked) lock; run_count -= 1
//!   while run_count > 0: wait  <───────── if 0: prune retired, notify_all
//!   unlock, return
//! ```
//!
//! When `deregister` returns, no pass that could still invoke the removed
//! handler is running, so the caller may release whatever the handler's
//! context refers to.
//!
//! # Lazy initialization
//!
//! Lists may be declared `static` with [`HandlerList::new_static`].  The
//! entry storage, lock and drain condition are created on first touch and
//! never again.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Condvar, Mutex, RawMutex};
use serde::{Deserialize, Serialize};

use crate::dispatch::DispatchPass;
use crate::entry::{Entry, HandlerInfo, HandlerTag};
use crate::error::{RegistryError, Result};

/// Longest list name, in bytes, accepted anywhere in the registry.
pub const MAX_NAME_LEN: usize = 64;

pub(crate) fn assert_name_fits(name: &str) {
    assert!(
        name.len() <= MAX_NAME_LEN,
        "handler list name `{name}` is {} bytes, limit is {MAX_NAME_LEN}",
        name.len()
    );
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub(crate) struct ListState {
    pub(crate) entries: Vec<Arc<Entry>>,
    pub(crate) run_count: usize,
}

impl ListState {
    /// Unlink retired entries.  Returns how many were removed.
    pub(crate) fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.is_live());
        before - self.entries.len()
    }

    fn live_len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_live()).count()
    }
}

/// Lock, drain condition and name of an initialized list.
#[derive(Clone)]
pub(crate) struct ListCore {
    pub(crate) name: Arc<str>,
    pub(crate) state: Arc<Mutex<ListState>>,
    pub(crate) drained: Arc<Condvar>,
}

impl ListCore {
    fn new(name: &str) -> Self {
        tracing::trace!(list = %name, "handler list initialized");
        Self {
            name: Arc::from(name),
            state: Arc::new(Mutex::new(ListState {
                entries: Vec::new(),
                run_count: 0,
            })),
            drained: Arc::new(Condvar::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// HandlerList
// ---------------------------------------------------------------------------

/// Priority-ordered handlers registered under one event name.
pub struct HandlerList {
    name: Cow<'static, str>,
    core: OnceLock<ListCore>,
}

impl HandlerList {
    /// Create a list with a runtime name.
    ///
    /// # Panics
    ///
    /// If `name` is longer than [`MAX_NAME_LEN`] bytes.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        assert_name_fits(&name);
        Self {
            name: Cow::Owned(name),
            core: OnceLock::new(),
        }
    }

    /// Create a list suitable for a `static` item.
    ///
    /// ```rust
    /// # use evhandler::HandlerList;
    /// static LINK_UP: HandlerList = HandlerList::new_static("net.link-up");
    /// assert!(!LINK_UP.is_initialized());
    /// ```
    #[must_use]
    pub const fn new_static(name: &'static str) -> Self {
        assert!(name.len() <= MAX_NAME_LEN, "handler list name exceeds MAX_NAME_LEN");
        Self {
            name: Cow::Borrowed(name),
            core: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the list's storage and lock exist.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.core.get().is_some()
    }

    pub(crate) fn core(&self) -> &ListCore {
        self.core.get_or_init(|| ListCore::new(&self.name))
    }

    /// Acquire this list's lock.
    ///
    /// The returned guard is the same one [`Registry::find_list`] hands out.
    ///
    /// [`Registry::find_list`]: crate::Registry::find_list
    pub fn lock(&self) -> LockedList {
        LockedList::acquire(self.core())
    }

    /// Link `entry` in priority order.
    pub(crate) fn link(&self, entry: Arc<Entry>, limit: usize) -> Result<()> {
        let core = self.core();
        let mut state = core.state.lock();

        if state.entries.len() >= limit {
            tracing::warn!(list = %core.name, limit, "handler list full, registration rejected");
            return Err(RegistryError::ListFull {
                list: core.name.to_string(),
                limit,
            });
        }
        state.entries.try_reserve(1)?;

        let priority = entry.sort_priority();
        let at = state
            .entries
            .iter()
            .position(|e| e.sort_priority() > priority)
            .unwrap_or(state.entries.len());
        state.entries.insert(at, entry);
        Ok(())
    }

    /// Remove one handler (`Some(tag)`) or every handler (`None`).
    ///
    /// If no pass is running the entries are unlinked at once; otherwise they
    /// are retired and left for the last pass to prune.  Either way this call
    /// blocks until the list's run count drains to zero, with no timeout.
    ///
    /// Returns how many entries were removed or retired.  An unknown tag
    /// removes nothing but still waits for the drain.
    ///
    /// Calling this from inside a handler of the same list, or while holding
    /// this list's [`LockedList`], never returns.
    pub fn deregister(&self, tag: Option<HandlerTag>) -> usize {
        let Some(core) = self.core.get() else {
            return 0;
        };
        let targets = |e: &Entry| tag.is_none_or(|t| e.tag() == t);

        let mut state = core.state.lock();
        let removed = if state.run_count == 0 {
            let before = state.entries.len();
            state.entries.retain(|e| !targets(e));
            before - state.entries.len()
        } else {
            let retired = state
                .entries
                .iter()
                .filter(|e| targets(e))
                .filter(|e| e.retire())
                .count();
            tracing::debug!(
                list = %core.name,
                retired,
                run_count = state.run_count,
                "deregistration deferred until dispatch drains"
            );
            retired
        };

        while state.run_count > 0 {
            core.drained.wait(&mut state);
        }
        drop(state);

        match tag {
            Some(tag) => tracing::debug!(list = %core.name, %tag, removed, "handler deregistered"),
            None => tracing::debug!(list = %core.name, removed, "handler list cleared"),
        }
        removed
    }

    /// Start a dispatch pass over this list.
    pub fn begin_pass(&self) -> DispatchPass {
        self.lock().begin_pass()
    }

    /// Run one pass, invoking every live handler with `args`.
    ///
    /// Returns the number of handlers invoked.
    pub fn dispatch(&self, args: &dyn Any) -> usize {
        self.begin_pass().invoke(args)
    }

    /// Entries currently linked, live or retired.
    #[must_use]
    pub fn len(&self) -> usize {
        self.core.get().map_or(0, |c| c.state.lock().entries.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries that a new pass would invoke.
    #[must_use]
    pub fn live_len(&self) -> usize {
        self.core.get().map_or(0, |c| c.state.lock().live_len())
    }

    #[must_use]
    pub fn run_count(&self) -> usize {
        self.core.get().map_or(0, |c| c.state.lock().run_count)
    }

    /// Serializable view of the list.
    #[must_use]
    pub fn snapshot(&self) -> ListInfo {
        match self.core.get() {
            Some(core) => ListInfo::capture(&core.name, &core.state.lock()),
            None => ListInfo {
                name: self.name.to_string(),
                handlers: Vec::new(),
                live: 0,
                retired: 0,
                run_count: 0,
            },
        }
    }
}

impl fmt::Debug for HandlerList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerList")
            .field("name", &self.name)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// LockedList
// ---------------------------------------------------------------------------

/// A list whose lock is held.  The lock is released on drop.
pub struct LockedList {
    guard: ArcMutexGuard<RawMutex, ListState>,
    core: ListCore,
}

impl LockedList {
    pub(crate) fn acquire(core: &ListCore) -> Self {
        Self {
            guard: core.state.lock_arc(),
            core: core.clone(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.core.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.guard.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guard.entries.is_empty()
    }

    #[must_use]
    pub fn live_len(&self) -> usize {
        self.guard.live_len()
    }

    #[must_use]
    pub fn run_count(&self) -> usize {
        self.guard.run_count
    }

    /// Linked entries in dispatch order, retired ones included.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.guard.entries.iter().map(Arc::as_ref)
    }

    /// Unlink every retired entry and wake drain waiters if any were removed.
    ///
    /// Entries a running pass has snapshotted stay allocated until that pass
    /// ends.
    pub fn prune(&mut self) -> usize {
        let pruned = self.guard.prune();
        if pruned > 0 {
            tracing::trace!(list = %self.core.name, pruned, "retired handlers pruned");
            self.core.drained.notify_all();
        }
        pruned
    }

    /// Start a dispatch pass, releasing the lock.
    pub fn begin_pass(self) -> DispatchPass {
        let Self { mut guard, core } = self;
        DispatchPass::begin(core, &mut guard)
    }

    #[must_use]
    pub fn snapshot(&self) -> ListInfo {
        ListInfo::capture(&self.core.name, &self.guard)
    }
}

impl fmt::Debug for LockedList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockedList")
            .field("name", &self.core.name)
            .field("len", &self.len())
            .field("run_count", &self.run_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Introspection
// ---------------------------------------------------------------------------

/// Serializable snapshot of a [`HandlerList`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListInfo {
    pub name: String,
    /// Linked entries in dispatch order.
    pub handlers: Vec<HandlerInfo>,
    pub live: usize,
    pub retired: usize,
    pub run_count: usize,
}

impl ListInfo {
    fn capture(name: &str, state: &ListState) -> Self {
        let handlers: Vec<HandlerInfo> = state.entries.iter().map(|e| e.info()).collect();
        let live = handlers.iter().filter(|h| h.live).count();
        Self {
            name: name.to_string(),
            retired: handlers.len() - live,
            handlers,
            live,
            run_count: state.run_count,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
