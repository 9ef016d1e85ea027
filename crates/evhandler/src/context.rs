//! Handler capability and registration context.
//!
//! A subsystem registers a [`Handler`] together with a [`HandlerContext`].  The
//! registry never interprets either: the context is copied verbatim at
//! registration and handed back on every invocation, and the per-event
//! argument is passed through as `&dyn Any` for the handler to downcast.

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scope of one registration.
///
/// Two 128-bit identifiers: `from` names the registering instance and
/// `target` the instance the handler acts for (a particular device, mount,
/// session, ...).  [`HandlerContext::NONE`] is the unscoped context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerContext {
    pub from: Uuid,
    pub target: Uuid,
}

impl HandlerContext {
    /// The unscoped context (both identifiers nil).
    pub const NONE: Self = Self {
        from: Uuid::nil(),
        target: Uuid::nil(),
    };

    #[must_use]
    pub const fn new(from: Uuid, target: Uuid) -> Self {
        Self { from, target }
    }

    /// True if either identifier equals `id`.
    #[must_use]
    pub fn involves(&self, id: Uuid) -> bool {
        self.from == id || self.target == id
    }
}

impl fmt::Display for HandlerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.from, self.target)
    }
}

/// A callback registered for an event.
///
/// Implemented for every `Fn(&HandlerContext, &dyn Any) + Send + Sync`
/// closure; annotate the closure's parameter types when passing one directly:
///
/// ```rust
/// # use std::any::Any;
/// # use evhandler::{Handler, HandlerContext};
/// let h = |_ctx: &HandlerContext, args: &dyn Any| {
///     if let Some(code) = args.downcast_ref::<u32>() {
///         println!("link state {code}");
///     }
/// };
/// h.handle(&HandlerContext::NONE, &7u32);
/// ```
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, context: &HandlerContext, args: &dyn Any);
}

impl<F> Handler for F
where
    F: Fn(&HandlerContext, &dyn Any) + Send + Sync + 'static,
{
    fn handle(&self, context: &HandlerContext, args: &dyn Any) {
        self(context, args)
    }
}
