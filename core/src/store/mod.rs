//! Snapshot store
//!
//! Keeps the session's base snapshot plus one delta-encoded snapshot per save
//! interval. Diffs are computed on short-lived worker threads; the number of
//! computations in flight is capped, and callers that would exceed the cap
//! block until a worker finishes.

mod handle;

#[cfg(test)]
mod tests;

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::delta::{CodecError, DeltaCodec};
use crate::schedule::{Frame, SaveSchedule};

pub use handle::DiffHandle;

/// Error storing or reconstructing a snapshot
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// `capture_base` was called twice in one session
    #[error("base snapshot already captured for this session")]
    BaseAlreadyCaptured,

    /// No base snapshot has been captured yet
    #[error("no base snapshot has been captured")]
    MissingBase,

    /// Frame is not a save frame after the base
    #[error("frame {0} is not an interval save frame")]
    OffSchedule(Frame),

    /// No diff was scheduled for the frame
    #[error("no snapshot stored for frame {0}")]
    NoDiff(Frame),

    /// The worker computing the diff did not produce one
    #[error("diff computation for frame {0} failed")]
    DiffFailed(Frame),

    /// The store was closed while waiting for capacity
    #[error("snapshot store is closed")]
    Closed,

    /// The diff worker thread could not be started
    #[error("failed to spawn diff worker: {0}")]
    Spawn(String),

    /// The diff could not be decoded against the base
    #[error("failed to reconstruct snapshot at frame {frame}: {source}")]
    Codec {
        frame: Frame,
        #[source]
        source: CodecError,
    },
}

/// Point-in-time store statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Diff entries, pending or ready
    pub diff_count: usize,
    /// Entries whose computation has not finished
    pub pending: usize,
    /// Computations currently holding a capacity slot
    pub outstanding: usize,
    /// Total size of ready diffs
    pub compressed_bytes: usize,
    /// Size of the base snapshot
    pub base_bytes: usize,
}

struct StoreInner {
    base: Option<Arc<[u8]>>,
    diffs: HashMap<Frame, DiffHandle>,
    outstanding: usize,
    open: bool,
}

struct StoreShared {
    inner: Mutex<StoreInner>,
    capacity: Condvar,
}

impl StoreShared {
    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases a capacity slot when a diff worker ends, however it ends
struct InFlight {
    shared: Arc<StoreShared>,
    handle: DiffHandle,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.handle.fail_if_pending();
        let mut inner = self.shared.lock();
        inner.outstanding = inner.outstanding.saturating_sub(1);
        drop(inner);
        self.shared.capacity.notify_all();
    }
}

/// Base snapshot plus delta-encoded interval snapshots
#[derive(Clone)]
pub struct SnapshotStore {
    shared: Arc<StoreShared>,
    codec: Arc<dyn DeltaCodec>,
    schedule: SaveSchedule,
    max_in_flight: usize,
}

impl SnapshotStore {
    /// Create an open, empty store
    pub fn new(codec: Arc<dyn DeltaCodec>, schedule: SaveSchedule, max_in_flight: usize) -> Self {
        Self {
            shared: Arc::new(StoreShared {
                inner: Mutex::new(StoreInner {
                    base: None,
                    diffs: HashMap::new(),
                    outstanding: 0,
                    open: true,
                }),
                capacity: Condvar::new(),
            }),
            codec,
            schedule,
            max_in_flight: max_in_flight.max(1),
        }
    }

    pub fn schedule(&self) -> SaveSchedule {
        self.schedule
    }

    /// Store the session's base snapshot
    pub fn capture_base(&self, state: Vec<u8>) -> Result<(), StoreError> {
        let mut inner = self.shared.lock();
        if !inner.open {
            return Err(StoreError::Closed);
        }
        if inner.base.is_some() {
            return Err(StoreError::BaseAlreadyCaptured);
        }
        debug!(bytes = state.len(), "Captured base snapshot");
        inner.base = Some(Arc::from(state));
        Ok(())
    }

    /// Base snapshot, if captured
    pub fn base(&self) -> Option<Arc<[u8]>> {
        self.shared.lock().base.clone()
    }

    /// Start computing the diff of `state` against the base on a worker thread
    ///
    /// Blocks while the store is at capacity. Scheduling a frame that already
    /// has an entry returns the existing handle.
    pub fn schedule_diff(&self, frame: Frame, state: Vec<u8>) -> Result<DiffHandle, StoreError> {
        if frame <= self.schedule.first_save_frame() || !self.schedule.is_save_frame(frame) {
            return Err(StoreError::OffSchedule(frame));
        }

        let mut inner = self.wait_for_capacity_locked();
        if !inner.open {
            return Err(StoreError::Closed);
        }
        let base = inner.base.clone().ok_or(StoreError::MissingBase)?;
        if let Some(existing) = inner.diffs.get(&frame) {
            return Ok(existing.clone());
        }

        let handle = DiffHandle::pending(frame);
        inner.diffs.insert(frame, handle.clone());
        inner.outstanding += 1;
        drop(inner);

        let guard = InFlight {
            shared: Arc::clone(&self.shared),
            handle: handle.clone(),
        };
        let codec = Arc::clone(&self.codec);

        debug!(frame, "Processing diff");
        thread::Builder::new()
            .name(format!("snapshot-diff-{frame}"))
            .spawn(move || {
                match codec.encode(&base, &state) {
                    Ok(diff) => {
                        debug!(frame, bytes = diff.len(), "Done processing diff");
                        guard.handle.complete(diff);
                    }
                    // Dropping the guard marks the handle failed
                    Err(e) => warn!(frame, error = %e, "Failed to encode diff"),
                }
            })
            .map_err(|e| {
                warn!(frame, error = %e, "Failed to spawn diff worker");
                StoreError::Spawn(e.to_string())
            })?;

        Ok(handle)
    }

    /// Whether an entry (pending or ready) exists for `frame`
    pub fn has_diff(&self, frame: Frame) -> bool {
        self.shared.lock().diffs.contains_key(&frame)
    }

    /// Whether the entry for `frame` exists and its computation finished
    pub fn is_diff_ready(&self, frame: Frame) -> bool {
        let handle = self.shared.lock().diffs.get(&frame).cloned();
        handle.is_some_and(|handle| handle.is_finished())
    }

    /// Reconstruct the full snapshot for a save frame
    ///
    /// The base frame returns the base snapshot as is. Other frames block
    /// until their diff is ready, then decode it against the base.
    pub fn resolve(&self, frame: Frame) -> Result<Vec<u8>, StoreError> {
        let inner = self.shared.lock();
        let base = inner.base.clone().ok_or(StoreError::MissingBase)?;
        if self.schedule.is_base_frame(frame) {
            return Ok(base.to_vec());
        }
        let handle = inner
            .diffs
            .get(&frame)
            .cloned()
            .ok_or(StoreError::NoDiff(frame))?;
        drop(inner);

        let diff = handle.wait().ok_or(StoreError::DiffFailed(frame))?;
        self.codec
            .decode(&base, &diff)
            .map_err(|source| StoreError::Codec { frame, source })
    }

    /// Whether every capacity slot is taken
    pub fn at_capacity(&self) -> bool {
        self.shared.lock().outstanding >= self.max_in_flight
    }

    /// Number of diff computations in flight
    pub fn outstanding(&self) -> usize {
        self.shared.lock().outstanding
    }

    /// Block while every capacity slot is taken
    ///
    /// Returns `false` if the store was closed instead.
    pub fn wait_for_capacity(&self) -> bool {
        self.wait_for_capacity_locked().open
    }

    fn wait_for_capacity_locked(&self) -> MutexGuard<'_, StoreInner> {
        let inner = self.shared.lock();
        if inner.open && inner.outstanding >= self.max_in_flight {
            debug!(
                outstanding = inner.outstanding,
                "Processing too many diffs, blocking"
            );
        }
        self.shared
            .capacity
            .wait_while(inner, |inner| {
                inner.open && inner.outstanding >= self.max_in_flight
            })
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop all diff entries; the base snapshot is kept
    pub fn clear(&self) {
        let mut inner = self.shared.lock();
        inner.diffs = HashMap::new();
    }

    /// Accept new work again after [`close`](Self::close)
    pub fn open(&self) {
        self.shared.lock().open = true;
    }

    /// Refuse new work and wake every thread waiting for capacity
    pub fn close(&self) {
        self.shared.lock().open = false;
        self.shared.capacity.notify_all();
    }

    pub fn is_open(&self) -> bool {
        self.shared.lock().open
    }

    /// Close the store and drop every snapshot, base included
    pub fn reset(&self) {
        let mut inner = self.shared.lock();
        inner.open = false;
        inner.diffs = HashMap::new();
        inner.base = None;
        drop(inner);
        self.shared.capacity.notify_all();
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.shared.lock();
        let mut stats = StoreStats {
            diff_count: inner.diffs.len(),
            outstanding: inner.outstanding,
            base_bytes: inner.base.as_ref().map_or(0, |base| base.len()),
            ..Default::default()
        };
        for handle in inner.diffs.values() {
            match handle.ready_len() {
                Some(len) => stats.compressed_bytes += len,
                None if !handle.is_finished() => stats.pending += 1,
                None => {}
            }
        }
        stats
    }
}
