//! Shared playback state
//!
//! One record guarded by a single mutex. The simulation thread, the snapshot
//! producer and the seek coordinator all read and write it; each of the three
//! condition variables in [`SessionShared`] is paired with this mutex.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::config::PlaybackConfig;
use crate::host::HostBindings;
use crate::schedule::{Frame, SaveSchedule};
use crate::store::SnapshotStore;

/// Mutable playback record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackState {
    /// Furthest frame reached; only moves back when a seek relocates it
    pub current_frame: Option<Frame>,
    /// Seek destination, `None` when no seek is active
    pub target_frame: Option<Frame>,
    /// Highest frame observed so far
    pub latest_frame: Frame,
    pub jump_back_requested: bool,
    pub jump_forward_requested: bool,
    pub hard_fast_forward: bool,
    pub soft_fast_forward: bool,
    pub soft_fast_forward_last_frame: Option<Frame>,
    /// Whether the base snapshot exists and seeking is possible
    pub in_playback: bool,
    /// Whether the background loops should keep running
    pub running: bool,
    /// Incremented on every session start; loops exit when it moves on
    pub(crate) generation: u64,
    /// Save frame the simulation is parked on until the producer captures it
    pub(crate) capture_request: Option<Frame>,
    /// Frame a hard fast-forward is waiting for
    pub(crate) awaiting_target: Option<Frame>,
    pub(crate) target_reached: bool,
    /// Simulation is held on the target frame until the coordinator pauses it
    pub(crate) holding_at_target: bool,
}

/// What a frame advance requires of the other threads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct AdvanceOutcome {
    /// The fast-forward target was reached; wake the coordinator
    pub target_reached: bool,
}

impl PlaybackState {
    pub fn new(config: &PlaybackConfig) -> Self {
        Self {
            current_frame: None,
            target_frame: None,
            latest_frame: config.game_first_frame,
            jump_back_requested: false,
            jump_forward_requested: false,
            hard_fast_forward: false,
            soft_fast_forward: false,
            soft_fast_forward_last_frame: None,
            in_playback: false,
            running: false,
            generation: 0,
            capture_request: None,
            awaiting_target: None,
            target_reached: false,
            holding_at_target: false,
        }
    }

    /// Whether loops spawned for `generation` should keep going
    pub(crate) fn is_live(&self, generation: u64) -> bool {
        self.running && self.generation == generation
    }

    /// Whether the coordinator has work
    pub fn seek_requested(&self) -> bool {
        self.in_playback
            && (self.jump_back_requested || self.jump_forward_requested || self.target_frame.is_some())
    }

    /// Record that the simulation finished `frame`
    pub(crate) fn advance(&mut self, frame: Frame) -> AdvanceOutcome {
        let mut outcome = AdvanceOutcome::default();
        self.latest_frame = self.latest_frame.max(frame);

        if self.in_playback
            && let Some(target) = self.awaiting_target
            && frame >= target
        {
            self.move_current_to(target);
            self.awaiting_target = None;
            self.target_reached = true;
            self.holding_at_target = true;
            outcome.target_reached = true;
        }

        self.current_frame = Some(self.current_frame.map_or(frame, |current| current.max(frame)));
        outcome
    }

    /// Put the current frame where a seek left the simulation
    pub(crate) fn move_current_to(&mut self, frame: Frame) {
        self.current_frame = Some(frame);
    }

    /// Whether the caller should skip rendering `frame`
    pub fn should_fast_forward_frame(&self, frame: Frame, throttle: i32) -> bool {
        if self.hard_fast_forward {
            return true;
        }
        if !self.soft_fast_forward {
            return false;
        }
        self.soft_fast_forward_last_frame
            .is_none_or(|last| frame.saturating_sub(last) >= throttle)
    }

    /// Clear everything a session accumulated; the generation counter survives
    pub(crate) fn reset(&mut self, config: &PlaybackConfig) {
        let generation = self.generation;
        *self = Self::new(config);
        self.generation = generation;
    }
}

/// State shared between the session handle and its background loops
pub(crate) struct SessionShared {
    pub config: PlaybackConfig,
    pub schedule: SaveSchedule,
    pub host: HostBindings,
    pub store: SnapshotStore,
    state: Mutex<PlaybackState>,
    /// Wakes the producer when a capture is requested
    pub capture_requested: Condvar,
    /// Wakes the simulation thread when its capture is done or its hold
    /// on the seek target is lifted
    pub released: Condvar,
    /// Wakes the coordinator when the fast-forward target is reached
    pub target_reached: Condvar,
}

impl SessionShared {
    pub fn new(config: PlaybackConfig, host: HostBindings, store: SnapshotStore) -> Self {
        let state = PlaybackState::new(&config);
        Self {
            schedule: config.schedule(),
            config,
            host,
            store,
            state: Mutex::new(state),
            capture_requested: Condvar::new(),
            released: Condvar::new(),
            target_reached: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, PlaybackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn notify_all(&self) {
        self.capture_requested.notify_all();
        self.released.notify_all();
        self.target_reached.notify_all();
    }
}
