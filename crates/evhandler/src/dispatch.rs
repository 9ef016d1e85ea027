//! Dispatch passes.
//!
//! A [`DispatchPass`] is one walk over a list's handlers.  Beginning a pass
//! bumps the list's run count and snapshots the linked entries under the
//! list lock; the lock is then released so handlers run without it.  Dropping
//! the pass, normally or while unwinding from a panicking handler, takes the
//! lock again and decrements the run count.  The pass that brings the count
//! to zero prunes retired entries and wakes every blocked `deregister`.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::entry::Entry;
use crate::list::{ListCore, ListState};

/// An in-progress walk over one list.
#[must_use = "a pass holds the list's run count until dropped"]
pub struct DispatchPass {
    core: ListCore,
    snapshot: Vec<Arc<Entry>>,
}

impl DispatchPass {
    /// Caller holds the list lock via `state`.
    pub(crate) fn begin(core: ListCore, state: &mut ListState) -> Self {
        state.run_count += 1;
        let snapshot = state.entries.clone();
        tracing::trace!(
            list = %core.name,
            run_count = state.run_count,
            handlers = snapshot.len(),
            "dispatch pass started"
        );
        Self { core, snapshot }
    }

    #[must_use]
    pub fn list_name(&self) -> &str {
        &self.core.name
    }

    /// Live handlers in dispatch order.
    ///
    /// Retirement is checked as each entry is reached, so a handler retired
    /// mid-pass is skipped from that point on.
    pub fn handlers(&self) -> impl Iterator<Item = &Entry> {
        self.snapshot.iter().map(Arc::as_ref).filter(|e| e.is_live())
    }

    /// Invoke every live handler with `args`, then end the pass.
    ///
    /// Returns how many handlers ran.
    pub fn invoke(self, args: &dyn Any) -> usize {
        let mut invoked = 0;
        for entry in self.handlers() {
            entry.invoke(args);
            invoked += 1;
        }
        invoked
    }
}

impl Drop for DispatchPass {
    fn drop(&mut self) {
        // Release our references before the run count can reach zero.
        self.snapshot.clear();

        let mut state = self.core.state.lock();
        state.run_count -= 1;
        if state.run_count == 0 {
            let pruned = state.prune();
            self.core.drained.notify_all();
            tracing::trace!(list = %self.core.name, pruned, "dispatch drained");
        }
    }
}

impl fmt::Debug for DispatchPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchPass")
            .field("list", &self.core.name)
            .field("snapshot", &self.snapshot.len())
            .finish()
    }
}
