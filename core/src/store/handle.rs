//! Handle to a diff being computed on a worker thread

use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crate::schedule::Frame;

#[derive(Debug)]
enum DiffState {
    Pending,
    Ready(Arc<Vec<u8>>),
    Failed,
}

#[derive(Debug)]
struct DiffSlot {
    state: Mutex<DiffState>,
    finished: Condvar,
}

/// Shared handle to a diff that is pending or ready
///
/// Cloning is cheap; all clones observe the same result. Readers block on
/// [`wait`](DiffHandle::wait) until the worker finishes.
#[derive(Debug, Clone)]
pub struct DiffHandle {
    frame: Frame,
    slot: Arc<DiffSlot>,
}

impl DiffHandle {
    pub(super) fn pending(frame: Frame) -> Self {
        Self {
            frame,
            slot: Arc::new(DiffSlot {
                state: Mutex::new(DiffState::Pending),
                finished: Condvar::new(),
            }),
        }
    }

    /// Frame this diff was captured on
    pub fn frame(&self) -> Frame {
        self.frame
    }

    /// Whether the computation has finished (successfully or not)
    pub fn is_finished(&self) -> bool {
        let state = self.slot.state.lock().unwrap_or_else(PoisonError::into_inner);
        !matches!(*state, DiffState::Pending)
    }

    /// Size of the compressed diff, if ready
    pub fn ready_len(&self) -> Option<usize> {
        let state = self.slot.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &*state {
            DiffState::Ready(diff) => Some(diff.len()),
            _ => None,
        }
    }

    /// Block until the computation finishes
    ///
    /// Returns `None` if the worker failed to produce a diff.
    pub fn wait(&self) -> Option<Arc<Vec<u8>>> {
        let state = self.slot.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = self
            .slot
            .finished
            .wait_while(state, |state| matches!(state, DiffState::Pending))
            .unwrap_or_else(PoisonError::into_inner);
        match &*state {
            DiffState::Ready(diff) => Some(Arc::clone(diff)),
            _ => None,
        }
    }

    pub(super) fn complete(&self, diff: Vec<u8>) {
        self.finish(DiffState::Ready(Arc::new(diff)));
    }

    /// Mark the diff failed unless it already finished
    pub(super) fn fail_if_pending(&self) {
        let mut state = self.slot.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, DiffState::Pending) {
            *state = DiffState::Failed;
            drop(state);
            self.slot.finished.notify_all();
        }
    }

    fn finish(&self, result: DiffState) {
        let mut state = self.slot.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = result;
        drop(state);
        self.slot.finished.notify_all();
    }
}
