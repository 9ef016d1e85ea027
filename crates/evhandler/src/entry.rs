//! Registered handlers.
//!
//! An [`Entry`] is one handler linked into a [`HandlerList`]: the callback,
//! the context it was registered with, and its priority.  Entries are shared
//! as `Arc<Entry>` between the list and any dispatch pass that snapshotted
//! it, so unlinking never frees an entry a pass is still walking.
//!
//! An entry is either *live* or *retired*.  Deregistering while a pass is in
//! flight retires the entry instead of unlinking it; passes skip retired
//! entries and the last pass to finish prunes them.
//!
//! [`HandlerList`]: crate::list::HandlerList

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::{Handler, HandlerContext};

/// Reserved priority reported by retired entries.
///
/// Registering a handler at this priority is a caller bug and panics.
pub const DEAD_PRIORITY: i32 = i32::MIN;

/// Opaque handle returned by registration, used to deregister the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerTag(Uuid);

impl HandlerTag {
    pub(crate) fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for HandlerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One registered handler.
pub struct Entry {
    tag: HandlerTag,
    handler: Box<dyn Handler>,
    context: HandlerContext,
    priority: i32,
    retired: AtomicBool,
    registered_at: DateTime<Utc>,
}

impl Entry {
    pub(crate) fn new(handler: Box<dyn Handler>, context: HandlerContext, priority: i32) -> Self {
        assert!(
            priority != DEAD_PRIORITY,
            "handler priority {DEAD_PRIORITY} is reserved for retired entries"
        );
        Self {
            tag: HandlerTag::new(),
            handler,
            context,
            priority,
            retired: AtomicBool::new(false),
            registered_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn tag(&self) -> HandlerTag {
        self.tag
    }

    #[must_use]
    pub fn context(&self) -> &HandlerContext {
        &self.context
    }

    /// The registration priority, or [`DEAD_PRIORITY`] once retired.
    #[must_use]
    pub fn priority(&self) -> i32 {
        if self.is_live() {
            self.priority
        } else {
            DEAD_PRIORITY
        }
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.retired.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Call the handler with this entry's context.
    pub fn invoke(&self, args: &dyn Any) {
        self.handler.handle(&self.context, args);
    }

    /// Mark the entry retired.  Returns `false` if it already was.
    pub(crate) fn retire(&self) -> bool {
        !self.retired.swap(true, Ordering::AcqRel)
    }

    /// Ordering key used for insertion; ignores retirement.
    pub(crate) fn sort_priority(&self) -> i32 {
        self.priority
    }

    #[must_use]
    pub fn info(&self) -> HandlerInfo {
        HandlerInfo {
            tag: self.tag,
            priority: self.priority(),
            context: self.context,
            registered_at: self.registered_at,
            live: self.is_live(),
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("tag", &self.tag)
            .field("priority", &self.priority())
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// Serializable snapshot of an [`Entry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerInfo {
    pub tag: HandlerTag,
    /// [`DEAD_PRIORITY`] when `live` is false.
    pub priority: i32,
    pub context: HandlerContext,
    pub registered_at: DateTime<Utc>,
    pub live: bool,
}
