//! The patch capability the interception engine runs on.
//!
//! The engine never talks to an interception library directly; it drives this
//! narrow transactional interface instead, so the patching technology is
//! swappable and the engine is testable without touching process memory.
//! The Windows implementation lives in [`super::detours`].

use thiserror::Error;

use super::table::RedirectionEntry;

/// Errors from the patch transaction layer.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("a patch transaction is already in progress")]
    TransactionInProgress,

    #[error("no patch transaction is in progress")]
    NoTransaction,

    #[error("no installed patch for {0}")]
    NotPatched(&'static str),

    #[error("failed to commit patch transaction: {0}")]
    Commit(String),
}

/// A transactional binary-patch mechanism.
///
/// Operations queued between [`begin`](PatchBackend::begin) and
/// [`commit`](PatchBackend::commit) are applied as a unit: a commit either
/// installs (or removes) every queued patch or leaves the process untouched.
/// The implementation is responsible for synchronizing other threads in the
/// process while patches are written.
pub trait PatchBackend: Send {
    /// Opens a patch transaction for the current thread.
    fn begin(&mut self) -> Result<(), PatchError>;

    /// Queues "replace original with replacement" for one entry.
    fn install(&mut self, entry: &RedirectionEntry) -> Result<(), PatchError>;

    /// Queues "remove replacement, restore original" for one entry.
    fn remove(&mut self, entry: &RedirectionEntry) -> Result<(), PatchError>;

    /// Applies every queued operation atomically. The pending queue is
    /// consumed whether or not the commit succeeds; there are no retries.
    fn commit(&mut self) -> Result<(), PatchError>;
}

#[cfg(test)]
pub(crate) mod mock {
    //! An in-memory patch backend for engine tests: it tracks the effective
    //! address of every "function" instead of writing process memory.

    use std::collections::HashMap;
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Mutex};

    use super::*;

    enum PendingOp {
        Install(RedirectionEntry),
        Remove(RedirectionEntry),
    }

    #[derive(Default)]
    pub(crate) struct MockState {
        in_transaction: bool,
        pending: Vec<PendingOp>,
        /// original address -> currently effective address
        pub(crate) effective: HashMap<usize, usize>,
        pub(crate) commits: usize,
        pub(crate) fail_next_commit: bool,
    }

    #[derive(Clone, Default)]
    pub(crate) struct MockBackend {
        pub(crate) state: Arc<Mutex<MockState>>,
    }

    impl MockBackend {
        pub(crate) fn patched_count(&self) -> usize {
            self.state.lock().unwrap().effective.len()
        }

        pub(crate) fn commits(&self) -> usize {
            self.state.lock().unwrap().commits
        }

        pub(crate) fn fail_next_commit(&self) {
            self.state.lock().unwrap().fail_next_commit = true;
        }
    }

    impl PatchBackend for MockBackend {
        fn begin(&mut self) -> Result<(), PatchError> {
            let mut state = self.state.lock().unwrap();
            if state.in_transaction {
                return Err(PatchError::TransactionInProgress);
            }
            state.in_transaction = true;
            state.pending.clear();
            Ok(())
        }

        fn install(&mut self, entry: &RedirectionEntry) -> Result<(), PatchError> {
            let mut state = self.state.lock().unwrap();
            if !state.in_transaction {
                return Err(PatchError::NoTransaction);
            }
            state.pending.push(PendingOp::Install(*entry));
            Ok(())
        }

        fn remove(&mut self, entry: &RedirectionEntry) -> Result<(), PatchError> {
            let mut state = self.state.lock().unwrap();
            if !state.in_transaction {
                return Err(PatchError::NoTransaction);
            }
            if !state.effective.contains_key(&(entry.original as usize)) {
                return Err(PatchError::NotPatched(entry.name));
            }
            state.pending.push(PendingOp::Remove(*entry));
            Ok(())
        }

        fn commit(&mut self) -> Result<(), PatchError> {
            let mut state = self.state.lock().unwrap();
            if !state.in_transaction {
                return Err(PatchError::NoTransaction);
            }
            state.in_transaction = false;
            let ops = std::mem::take(&mut state.pending);

            if state.fail_next_commit {
                state.fail_next_commit = false;
                return Err(PatchError::Commit("simulated commit failure".into()));
            }

            state.commits += 1;
            for op in ops {
                match op {
                    PendingOp::Install(entry) => {
                        state
                            .effective
                            .insert(entry.original as usize, entry.replacement as usize);
                        // The mock "trampoline" just forwards to the original.
                        entry.slot.store(entry.original, Ordering::Release);
                    }
                    PendingOp::Remove(entry) => {
                        state.effective.remove(&(entry.original as usize));
                        entry.slot.store(entry.original, Ordering::Release);
                    }
                }
            }
            Ok(())
        }
    }
}
