//! Playback session
//!
//! [`PlaybackSession`] is the handle the emulator talks to. The simulation
//! thread reports every finished frame through
//! [`on_frame_advanced`](PlaybackSession::on_frame_advanced); UI code requests
//! seeks and jumps. Two background threads do the rest:
//!
//! - the snapshot producer captures the base snapshot and one snapshot per
//!   save interval, handing them to the [`SnapshotStore`] for compression
//! - the seek coordinator restores snapshots and fast-forwards to seek targets
//!
//! Save frames are captured while the simulation is held inside
//! `on_frame_advanced`, so a stored snapshot always matches its frame number.
//! Only the capture itself holds the simulation; compression runs on the
//! store's worker threads.

mod plan;
mod producer;
mod seek;
mod state;


use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use tracing::{debug, info};

use crate::config::{ConfigError, PlaybackConfig};
use crate::delta::DeltaCodec;
use crate::events::PlaybackEvent;
use crate::host::HostBindings;
use crate::schedule::Frame;
use crate::store::{SnapshotStore, StoreStats};

pub use plan::{SeekOrigin, SeekPlan, SeekRequest, plan_seek};
pub use seek::SeekError;
pub use state::PlaybackState;

use producer::SnapshotProducer;
use seek::SeekCoordinator;
use state::SessionShared;

/// Error starting a playback session
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid playback configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Seek-enabled replay playback controller
pub struct PlaybackSession {
    shared: Arc<SessionShared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl PlaybackSession {
    /// Create an idle session; nothing runs until [`start_session`](Self::start_session)
    pub fn new(
        config: PlaybackConfig,
        host: HostBindings,
        codec: Arc<dyn DeltaCodec>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let store = SnapshotStore::new(codec, config.schedule(), config.max_in_flight_diffs);
        Ok(Self {
            shared: Arc::new(SessionShared::new(config, host, store)),
            threads: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.shared.config
    }

    /// Start the snapshot producer and seek coordinator
    ///
    /// Does nothing if the session is already running.
    pub fn start_session(&self) -> Result<(), SessionError> {
        let generation = {
            let mut state = self.shared.lock();
            if state.running {
                return Ok(());
            }
            state.running = true;
            state.generation += 1;
            state.generation
        };
        self.shared.store.open();

        let producer = SnapshotProducer::spawn(Arc::clone(&self.shared), generation)
            .map_err(|source| self.abort_start("snapshot", source))?;
        let coordinator = SeekCoordinator::spawn(Arc::clone(&self.shared), generation)
            .map_err(|source| self.abort_start("seek", source))?;

        let mut threads = self.threads.lock().unwrap_or_else(PoisonError::into_inner);
        threads.clear();
        threads.push(producer);
        threads.push(coordinator);

        info!(generation, "Playback session started");
        Ok(())
    }

    fn abort_start(&self, name: &'static str, source: io::Error) -> SessionError {
        self.reset_session();
        SessionError::Spawn { name, source }
    }

    /// Report that the simulation finished `frame`
    ///
    /// Must be called from the simulation thread after every frame. Blocks
    /// while too many diffs are being compressed, and on save frames until
    /// the producer has captured the state.
    pub fn on_frame_advanced(&self, frame: Frame) {
        let shared = &*self.shared;

        // 1. Backpressure from the diff workers
        if self.is_running() && shared.store.at_capacity() {
            debug!(frame, "Holding simulation until a diff completes");
            shared.store.wait_for_capacity();
        }

        // 2. Progress and seek target
        let mut state = shared.lock();
        if state.advance(frame).target_reached {
            debug!(frame, "Seek target reached");
            shared.target_reached.notify_all();
            // Stay on the target until the coordinator has asked for a pause
            state = shared
                .released
                .wait_while(state, |state| state.running && state.holding_at_target)
                .unwrap_or_else(PoisonError::into_inner);
        }

        // 3. Hand save frames to the producer
        if state.running && self.capture_due(&state, frame) {
            state.capture_request = Some(frame);
            shared.capture_requested.notify_all();
            state = shared
                .released
                .wait_while(state, |state| {
                    state.running && state.capture_request == Some(frame)
                })
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(state);

        if shared.config.show_frame_index {
            shared
                .host
                .events
                .emit(PlaybackEvent::FrameIndexChanged { frame });
        }
    }

    fn capture_due(&self, state: &PlaybackState, frame: Frame) -> bool {
        let schedule = &self.shared.schedule;
        let store = &self.shared.store;

        if schedule.is_base_frame(frame) {
            return !state.in_playback && store.base().is_none();
        }
        self.shared.config.seekbar_enabled
            && state.in_playback
            && frame > schedule.first_save_frame()
            && schedule.is_save_frame(frame)
            && !store.has_diff(frame)
    }

    /// Raise the latest playable frame, e.g. as a replay file grows
    pub fn report_latest_frame(&self, frame: Frame) {
        let mut state = self.shared.lock();
        state.latest_frame = state.latest_frame.max(frame);
    }

    pub fn request_jump_back(&self) {
        self.shared.lock().jump_back_requested = true;
    }

    pub fn request_jump_forward(&self) {
        self.shared.lock().jump_forward_requested = true;
    }

    /// Seek to `frame`; clamped into the playable range when the seek runs
    pub fn set_seek_target(&self, frame: Frame) {
        self.shared.lock().target_frame = Some(frame);
    }

    /// Whether the host should skip presenting `frame`
    ///
    /// During soft fast-forward this returns `true` at most once per throttle
    /// window; call [`mark_fast_forwarded`](Self::mark_fast_forwarded) when
    /// acting on it.
    pub fn should_fast_forward_frame(&self, frame: Frame) -> bool {
        self.shared
            .lock()
            .should_fast_forward_frame(frame, self.shared.config.soft_fast_forward_throttle)
    }

    pub fn mark_fast_forwarded(&self, frame: Frame) {
        self.shared.lock().soft_fast_forward_last_frame = Some(frame);
    }

    pub fn set_soft_fast_forward(&self, enabled: bool) {
        let mut state = self.shared.lock();
        state.soft_fast_forward = enabled;
        if !enabled {
            state.soft_fast_forward_last_frame = None;
        }
    }

    /// Stop the background loops and forget every snapshot
    ///
    /// Never waits for the loops to exit; they notice the reset on their next
    /// wake-up. Safe to call from any thread, including the simulation thread.
    pub fn reset_session(&self) {
        let generation = {
            let mut state = self.shared.lock();
            state.reset(&self.shared.config);
            state.generation
        };
        self.shared.store.reset();
        self.shared.notify_all();

        let detached = std::mem::take(
            &mut *self.threads.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if !detached.is_empty() {
            info!(generation, "Playback session reset");
        }
    }

    pub fn status(&self) -> PlaybackState {
        self.shared.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    pub fn is_in_playback(&self) -> bool {
        self.shared.lock().in_playback
    }

    pub fn current_frame(&self) -> Option<Frame> {
        self.shared.lock().current_frame
    }

    pub fn latest_frame(&self) -> Frame {
        self.shared.lock().latest_frame
    }

    pub fn is_hard_fast_forward(&self) -> bool {
        self.shared.lock().hard_fast_forward
    }

    /// Whether a seek or jump is waiting or in progress
    pub fn is_seeking(&self) -> bool {
        self.shared.lock().seek_requested()
    }

    pub fn store_stats(&self) -> StoreStats {
        self.shared.store.stats()
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.reset_session();
    }
}
