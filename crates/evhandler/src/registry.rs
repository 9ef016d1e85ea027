//! Handler directory.
//!
//! The [`Registry`] maps event names to [`HandlerList`]s.  Its lock covers
//! directory membership only: looking up, creating and enumerating lists.
//! Everything about a list's contents is guarded by that list's own lock, so
//! contention on one event never blocks another.
//!
//! Internally the directory is a [`DashMap`].  Lookups take a shard read
//! lock; creating a list escalates to the shard write lock, which is the
//! only path that allocates a list header.
//!
//! # Example
//!
//! ```rust
//! # use std::any::Any;
//! # use evhandler::{HandlerContext, Registry};
//! let registry = Registry::new();
//! let tag = registry
//!     .register(
//!         None,
//!         "mount.added",
//!         |_: &HandlerContext, args: &dyn Any| {
//!             let _path = args.downcast_ref::<&str>();
//!         },
//!         HandlerContext::NONE,
//!         10,
//!     )
//!     .unwrap();
//!
//! assert_eq!(registry.dispatch("mount.added", &"/mnt/data"), Some(1));
//! assert_eq!(registry.deregister("mount.added", Some(tag)), 1);
//! registry.destroy();
//! ```

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry as Slot;

use crate::config::RegistryConfig;
use crate::context::{Handler, HandlerContext};
use crate::entry::{Entry, HandlerTag};
use crate::error::{RegistryError, Result};
use crate::list::{HandlerList, ListInfo, LockedList, assert_name_fits};

static GLOBAL: LazyLock<Registry> = LazyLock::new(Registry::new);

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Name → [`HandlerList`] directory.
///
/// Creating a `Registry` initializes it; [`Registry::destroy`] tears it
/// down.  Share it by reference or wrap it in an `Arc`.
pub struct Registry {
    directory: DashMap<String, Arc<HandlerList>>,
    /// Directory slots claimed so far, checked against `max_lists`.
    reserved: AtomicUsize,
    config: RegistryConfig,
}

impl Registry {
    /// Create an empty registry with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::build(RegistryConfig::default())
    }

    /// Create an empty registry with the given limits.
    pub fn with_config(config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: RegistryConfig) -> Self {
        tracing::debug!(
            max_lists = config.max_lists,
            max_handlers_per_list = config.max_handlers_per_list,
            "handler registry initialized"
        );
        Self {
            directory: DashMap::new(),
            reserved: AtomicUsize::new(0),
            config,
        }
    }

    /// The process-wide default registry, initialized on first use.
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register `handler` under `name` and return its tag.
    ///
    /// With `list: None` the list is looked up by name and created if
    /// absent.  With `Some(list)` the caller's own list is used as is; it is
    /// not entered into the directory.
    ///
    /// Handlers run in ascending `priority`; equal priorities run in
    /// registration order.
    ///
    /// # Panics
    ///
    /// If `name` exceeds [`MAX_NAME_LEN`], if `priority` is
    /// [`DEAD_PRIORITY`], or if a supplied list has a different name.
    ///
    /// [`MAX_NAME_LEN`]: crate::MAX_NAME_LEN
    /// [`DEAD_PRIORITY`]: crate::DEAD_PRIORITY
    pub fn register<H: Handler>(
        &self,
        list: Option<&HandlerList>,
        name: &str,
        handler: H,
        context: HandlerContext,
        priority: i32,
    ) -> Result<HandlerTag> {
        assert_name_fits(name);
        let entry = Arc::new(Entry::new(Box::new(handler), context, priority));
        let tag = entry.tag();
        let limit = self.config.max_handlers_per_list;

        match list {
            Some(list) => {
                assert_eq!(list.name(), name, "supplied handler list has a different name");
                list.link(entry, limit)?;
            }
            None => self.find_or_create(name)?.link(entry, limit)?,
        }

        tracing::debug!(list = %name, %tag, priority, "handler registered");
        Ok(tag)
    }

    fn find_or_create(&self, name: &str) -> Result<Arc<HandlerList>> {
        if let Some(slot) = self.directory.get(name) {
            slot.value().core();
            return Ok(Arc::clone(slot.value()));
        }

        match self.directory.entry(name.to_owned()) {
            Slot::Occupied(slot) => Ok(Arc::clone(slot.get())),
            Slot::Vacant(slot) => {
                self.reserve_slot()?;
                let list = Arc::new(HandlerList::new(name));
                list.core();
                slot.insert(Arc::clone(&list));
                tracing::debug!(list = %name, "handler list created");
                Ok(list)
            }
        }
    }

    fn reserve_slot(&self) -> Result<()> {
        let limit = self.config.max_lists;
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .map(drop)
            .map_err(|_| {
                tracing::warn!(limit, "handler directory full, list not created");
                RegistryError::DirectoryFull { limit }
            })
    }

    /// Look up `name` and return its list with the list lock held.
    ///
    /// The list lock is taken before the directory lock is released.  Do not
    /// call back into the registry while holding the returned guard.
    pub fn find_list(&self, name: &str) -> Option<LockedList> {
        let slot = self.directory.get(name)?;
        let locked = slot.value().lock();
        drop(slot);
        Some(locked)
    }

    /// Unlocked handle to the list registered under `name`.
    pub fn list(&self, name: &str) -> Option<Arc<HandlerList>> {
        self.directory.get(name).map(|slot| Arc::clone(slot.value()))
    }

    /// Deregister from the list named `name`.  See [`HandlerList::deregister`].
    ///
    /// Returns 0 if no such list exists.
    pub fn deregister(&self, name: &str, tag: Option<HandlerTag>) -> usize {
        // The directory lock must not be held while draining.
        self.list(name).map_or(0, |list| list.deregister(tag))
    }

    /// Run one pass over `name`, invoking every live handler with `args`.
    ///
    /// Returns `None` if no list is registered under `name`.
    pub fn dispatch(&self, name: &str, args: &dyn Any) -> Option<usize> {
        self.find_list(name).map(|locked| locked.begin_pass().invoke(args))
    }

    /// Names of every list in the directory, sorted.
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.directory.iter().map(|e| e.key().clone()).collect();
        names.sort_unstable();
        names
    }

    /// Snapshot of every list, sorted by name.
    pub fn snapshot(&self) -> Vec<ListInfo> {
        let mut lists: Vec<ListInfo> = self.directory.iter().map(|e| e.value().snapshot()).collect();
        lists.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        lists
    }

    /// Number of lists in the directory.
    pub fn len(&self) -> usize {
        self.directory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directory.is_empty()
    }

    /// Tear the registry down.
    ///
    /// # Panics
    ///
    /// If any list still has handlers linked, retired ones included.
    pub fn destroy(self) {
        for slot in self.directory.iter() {
            let list = slot.value();
            let remaining = list.len();
            assert!(
                remaining == 0,
                "registry destroyed with {remaining} handler(s) still on `{}`",
                list.name()
            );
        }
        tracing::debug!(lists = self.directory.len(), "handler registry destroyed");
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("lists", &self.directory.len())
            .field("config", &self.config)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use parking_lot::Mutex;
    use uuid::Uuid;

    use super::*;

    fn noop(_: &HandlerContext, _: &dyn Any) {}

    #[test]
    fn register_creates_list_once() {
        let registry = Registry::new();
        registry.register(None, "disk.attach", noop, HandlerContext::NONE, 0).unwrap();
        registry.register(None, "disk.attach", noop, HandlerContext::NONE, 1).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list("disk.attach").expect("list").len(), 2);
    }

    #[test]
    fn find_list_returns_locked_list() {
        let registry = Registry::new();
        registry.register(None, "a", noop, HandlerContext::NONE, 3).unwrap();

        let locked = registry.find_list("a").expect("list should exist");
        assert_eq!(locked.name(), "a");
        assert_eq!(locked.len(), 1);
        assert_eq!(locked.run_count(), 0);
        drop(locked);

        assert!(registry.find_list("missing").is_none());
    }

    #[test]
    fn dispatch_through_directory() {
        let registry = Registry::new();
        let total = Arc::new(AtomicU32::new(0));
        for p in 0..3 {
            let total = Arc::clone(&total);
            registry
                .register(
                    None,
                    "tick",
                    move |_: &HandlerContext, args: &dyn Any| {
                        total.fetch_add(*args.downcast_ref::<u32>().unwrap(), Ordering::SeqCst);
                    },
                    HandlerContext::NONE,
                    p,
                )
                .unwrap();
        }

        assert_eq!(registry.dispatch("tick", &5u32), Some(3));
        assert_eq!(total.load(Ordering::SeqCst), 15);
        assert_eq!(registry.dispatch("tock", &5u32), None);
    }

    #[test]
    fn handlers_get_their_own_context() {
        let registry = Registry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let devices: Vec<Uuid> = (0..3).map(|_| Uuid::now_v7()).collect();
        for dev in &devices {
            let seen = Arc::clone(&seen);
            registry
                .register(
                    None,
                    "dev.remove",
                    move |ctx: &HandlerContext, _: &dyn Any| seen.lock().push(ctx.target),
                    HandlerContext::new(Uuid::nil(), *dev),
                    0,
                )
                .unwrap();
        }

        registry.dispatch("dev.remove", &());
        assert_eq!(*seen.lock(), devices);
    }

    #[test]
    fn deregister_by_name() {
        let registry = Registry::new();
        let tag = registry.register(None, "x", noop, HandlerContext::NONE, 0).unwrap();
        registry.register(None, "x", noop, HandlerContext::NONE, 0).unwrap();

        assert_eq!(registry.deregister("x", Some(tag)), 1);
        assert_eq!(registry.deregister("x", None), 1);
        assert_eq!(registry.deregister("nope", None), 0);
        // The emptied list header survives until teardown.
        assert_eq!(registry.list_names(), vec!["x".to_string()]);
        registry.destroy();
    }

    #[test]
    fn directory_limit_leaves_no_partial_state() {
        let config = RegistryConfig {
            max_lists: 2,
            ..RegistryConfig::default()
        };
        let registry = Registry::with_config(config).unwrap();
        registry.register(None, "one", noop, HandlerContext::NONE, 0).unwrap();
        registry.register(None, "two", noop, HandlerContext::NONE, 0).unwrap();

        let err = registry
            .register(None, "three", noop, HandlerContext::NONE, 0)
            .unwrap_err();
        assert!(matches!(err, RegistryError::DirectoryFull { limit: 2 }));
        assert_eq!(registry.list_names(), vec!["one".to_string(), "two".to_string()]);

        // Existing lists still accept handlers.
        registry.register(None, "one", noop, HandlerContext::NONE, 1).unwrap();
    }

    #[test]
    fn handler_limit_applies_per_list() {
        let config = RegistryConfig {
            max_handlers_per_list: 1,
            ..RegistryConfig::default()
        };
        let registry = Registry::with_config(config).unwrap();
        registry.register(None, "a", noop, HandlerContext::NONE, 0).unwrap();
        registry.register(None, "b", noop, HandlerContext::NONE, 0).unwrap();

        let err = registry.register(None, "a", noop, HandlerContext::NONE, 0).unwrap_err();
        assert!(matches!(err, RegistryError::ListFull { .. }));
        assert_eq!(registry.list("a").unwrap().len(), 1);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = RegistryConfig {
            max_lists: 0,
            ..RegistryConfig::default()
        };
        assert!(matches!(
            Registry::with_config(config),
            Err(RegistryError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn supplied_list_stays_out_of_directory() {
        let registry = Registry::new();
        let own = HandlerList::new("private");
        let tag = registry
            .register(Some(&own), "private", noop, HandlerContext::NONE, 0)
            .unwrap();

        assert!(registry.is_empty());
        assert_eq!(own.len(), 1);
        assert_eq!(own.deregister(Some(tag)), 1);
    }

    #[test]
    #[should_panic(expected = "different name")]
    fn supplied_list_name_must_match() {
        let registry = Registry::new();
        let own = HandlerList::new("left");
        let _ = registry.register(Some(&own), "right", noop, HandlerContext::NONE, 0);
    }

    #[test]
    fn snapshot_is_sorted_and_serializable() {
        let registry = Registry::new();
        registry.register(None, "zeta", noop, HandlerContext::NONE, 2).unwrap();
        registry.register(None, "alpha", noop, HandlerContext::NONE, 1).unwrap();

        let snapshot = registry.snapshot();
        let names: Vec<&str> = snapshot.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(snapshot[0].live, 1);

        let json = serde_json::to_string(&snapshot).expect("serialize");
        let back: Vec<ListInfo> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, snapshot);
    }

    #[test]
    fn global_registry_is_shared() {
        let name = "test.global-registry";
        let tag = Registry::global()
            .register(None, name, noop, HandlerContext::NONE, 0)
            .unwrap();
        assert!(std::ptr::eq(Registry::global(), Registry::global()));
        assert_eq!(Registry::global().dispatch(name, &()), Some(1));
        assert_eq!(Registry::global().deregister(name, Some(tag)), 1);
    }

    #[test]
    fn destroy_empty_registry() {
        let registry = Registry::new();
        let tag = registry.register(None, "gone", noop, HandlerContext::NONE, 0).unwrap();
        registry.deregister("gone", Some(tag));
        registry.destroy();
    }

    #[test]
    #[should_panic(expected = "still on `busy`")]
    fn destroy_with_handlers_panics() {
        let registry = Registry::new();
        registry.register(None, "busy", noop, HandlerContext::NONE, 0).unwrap();
        registry.destroy();
    }
}
