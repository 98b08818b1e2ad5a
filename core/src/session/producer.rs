//! Snapshot producer thread
//!
//! Sleeps until the simulation parks on a save frame, captures the full state,
//! releases the simulation and hands the state to the store. The first capture
//! of a session becomes the base snapshot; later ones become diffs.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::events::PlaybackEvent;
use crate::schedule::Frame;
use crate::store::StoreError;

use super::state::SessionShared;

pub(super) struct SnapshotProducer {
    shared: Arc<SessionShared>,
    generation: u64,
}

impl SnapshotProducer {
    /// Spawn the producer loop for one session generation
    pub fn spawn(shared: Arc<SessionShared>, generation: u64) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("snapshot-producer".into())
            .spawn(move || Self { shared, generation }.run())
    }

    fn run(self) {
        info!(generation = self.generation, "Entering snapshot thread");

        while let Some(frame) = self.next_request() {
            self.capture(frame);

            // Bounds how often a parked simulation is re-examined
            thread::sleep(self.shared.config.poll_interval());
        }

        info!(generation = self.generation, "Exiting snapshot thread");
    }

    /// Block until a capture is requested; `None` once the session ends
    fn next_request(&self) -> Option<Frame> {
        let state = self.shared.lock();
        let state = self
            .shared
            .capture_requested
            .wait_while(state, |state| {
                state.is_live(self.generation) && state.capture_request.is_none()
            })
            .unwrap_or_else(|e| {
                warn!("Snapshot thread state mutex poisoned; continuing");
                e.into_inner()
            });

        if state.is_live(self.generation) {
            state.capture_request
        } else {
            None
        }
    }

    fn capture(&self, frame: Frame) {
        let shared = &self.shared;
        let is_base = shared.schedule.is_base_frame(frame);

        // 1. Serialize while the simulation is parked on `frame`
        let captured = shared.host.states.capture_state();

        // 2. Store the base only for a live session; the state lock is held
        // from the liveness check through the write
        let mut state = shared.lock();
        let live = state.is_live(self.generation);
        let mut base_ready = false;
        let pending_diff = match captured {
            Ok(bytes) if is_base && live => {
                match shared.store.capture_base(bytes) {
                    Ok(()) => {
                        base_ready = true;
                        state.in_playback = true;
                    }
                    Err(e) => warn!(frame, error = %e, "Failed to store base snapshot"),
                }
                None
            }
            Ok(_) if is_base => {
                debug!(frame, "Session ended, dropping base snapshot");
                None
            }
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(frame, error = %e, "Failed to capture state");
                None
            }
        };

        // 3. Release the simulation
        if state.capture_request == Some(frame) {
            state.capture_request = None;
        }
        drop(state);
        shared.released.notify_all();

        if base_ready {
            info!(frame, "Base snapshot captured, playback ready");
            shared.host.events.emit(PlaybackEvent::PlaybackReady { frame });
        }

        // 4. Compress in the background; may block at the in-flight ceiling
        let live = shared.lock().is_live(self.generation);
        if let Some(bytes) = pending_diff
            && live
        {
            match shared.store.schedule_diff(frame, bytes) {
                Ok(_) => debug!(frame, "Scheduled diff"),
                Err(StoreError::Closed) => debug!(frame, "Store closed, dropping capture"),
                Err(e) => warn!(frame, error = %e, "Failed to schedule diff"),
            }
        }
    }
}
