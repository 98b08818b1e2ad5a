//! Seek coordinator thread
//!
//! Polls for seek requests. Each seek parks the simulation, restores the best
//! stored snapshot, hard fast-forwards to the exact target when the snapshot
//! is not already there, and puts the simulation back in its prior run state.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use crate::events::{LoadPoint, PlaybackEvent};
use crate::host::{Overclock, ReplayMode, RunState};
use crate::schedule::Frame;
use crate::store::StoreError;

use super::plan::{SeekOrigin, SeekPlan, SeekRequest, plan_seek};
use super::state::SessionShared;

/// Why a seek could not restore its snapshot
#[derive(Debug, thiserror::Error)]
pub enum SeekError {
    /// The snapshot could not be reconstructed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The host rejected the reconstructed snapshot
    #[error("failed to restore snapshot at frame {frame}: {reason}")]
    Restore { frame: Frame, reason: String },
}

pub(super) struct SeekCoordinator {
    shared: Arc<SessionShared>,
    generation: u64,
}

impl SeekCoordinator {
    /// Spawn the coordinator loop for one session generation
    pub fn spawn(shared: Arc<SessionShared>, generation: u64) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("seek-coordinator".into())
            .spawn(move || Self { shared, generation }.run())
    }

    fn run(self) {
        info!(generation = self.generation, "Entering seek thread");

        loop {
            let request = {
                let state = self.shared.lock();
                if !state.is_live(self.generation) {
                    break;
                }
                SeekRequest::pending(&state)
            };

            if let Some(request) = request {
                self.seek(request);
            }

            thread::sleep(self.shared.config.poll_interval());
        }

        info!(generation = self.generation, "Exiting seek thread");
    }

    fn seek(&self, request: SeekRequest) {
        let shared = &self.shared;
        let simulation = &shared.host.simulation;

        // 1. Park the simulation between frames
        let was_paused = simulation.run_state() == RunState::Paused;
        simulation.pause();

        // 2. Resolve the request against the current position
        let origin = {
            let state = shared.lock();
            SeekOrigin {
                current: state
                    .current_frame
                    .unwrap_or(shared.schedule.first_save_frame()),
                latest: state.latest_frame,
            }
        };
        let plan = plan_seek(
            request,
            origin,
            &shared.schedule,
            shared.config.jump_interval,
            |frame| shared.store.has_diff(frame),
        );
        shared.lock().target_frame = Some(plan.target);

        info!(
            ?request,
            target = plan.target,
            current = origin.current,
            latest = origin.latest,
            load = ?plan.load,
            fast_forward = plan.fast_forward,
            "Seeking"
        );
        shared
            .host
            .events
            .emit(PlaybackEvent::SeekStarted { target: plan.target });

        // 3. Keep queued replays from ending before the new target
        self.widen_replay_window(plan.target);

        // 4. Restore and catch up
        match self.execute(&plan) {
            Ok(()) => {
                debug!(target = plan.target, "Seek finished");
                shared.host.events.emit(PlaybackEvent::SeekFinished {
                    target: plan.target,
                    loaded: plan.load,
                    fast_forwarded: plan.fast_forward,
                });
            }
            Err(e) => {
                error!(target = plan.target, error = %e, "Seek failed");
                shared.host.events.emit(PlaybackEvent::SeekFailed {
                    target: plan.target,
                    reason: e.to_string(),
                });
            }
        }

        // 5. Restore the prior run state and clear the request
        if !was_paused {
            simulation.resume();
        }
        let mut state = shared.lock();
        state.jump_back_requested = false;
        state.jump_forward_requested = false;
        state.target_frame = None;
    }

    fn execute(&self, plan: &SeekPlan) -> Result<(), SeekError> {
        if let Some(load) = plan.load {
            self.restore(load)?;
            self.shared.lock().move_current_to(load.frame());
        }
        if plan.fast_forward {
            self.fast_forward_to(plan.target);
        }
        Ok(())
    }

    fn restore(&self, load: LoadPoint) -> Result<(), SeekError> {
        let frame = load.frame();
        let snapshot = self.shared.store.resolve(frame)?;
        debug!(frame, bytes = snapshot.len(), "Restoring snapshot");
        self.shared
            .host
            .states
            .restore_state(&snapshot)
            .map_err(|e| SeekError::Restore {
                frame,
                reason: format!("{e:#}"),
            })
    }

    /// Run the simulation overclocked until it reports `target`
    fn fast_forward_to(&self, target: Frame) {
        let shared = &self.shared;
        let simulation = &shared.host.simulation;

        let previous = simulation.overclock();
        simulation.set_overclock(Overclock {
            enabled: true,
            factor: shared.config.fast_forward_overclock,
        });
        {
            let mut state = shared.lock();
            state.hard_fast_forward = true;
            state.awaiting_target = Some(target);
            state.target_reached = false;
        }

        simulation.resume();
        {
            let state = shared.lock();
            let state = shared
                .target_reached
                .wait_while(state, |state| {
                    state.is_live(self.generation) && !state.target_reached
                })
                .unwrap_or_else(|e| {
                    warn!("Seek thread state mutex poisoned; continuing");
                    e.into_inner()
                });
            if !state.target_reached {
                debug!(target, "Session ended during fast-forward");
            }
        }

        // Ask for the pause before lifting the hold so no frame slips past
        simulation.request_pause();
        {
            let mut state = shared.lock();
            state.awaiting_target = None;
            state.target_reached = false;
            state.holding_at_target = false;
        }
        shared.released.notify_all();
        simulation.pause();

        shared.lock().hard_fast_forward = false;
        simulation.set_overclock(previous);
    }

    fn widen_replay_window(&self, target: Frame) {
        let source = &self.shared.host.source;
        if source.mode() != ReplayMode::Queue {
            return;
        }

        let window = source.window();
        if window.start == self.shared.config.game_first_frame && window.end.is_none() {
            return;
        }

        let mut widened = window;
        if target < window.start {
            widened.start = target;
        }
        if window.end.is_some_and(|end| target > end) {
            widened.end = None;
        }
        if widened != window {
            debug!(?window, ?widened, "Widening replay window");
            source.set_window(widened);
        }
    }
}
