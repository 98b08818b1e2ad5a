//! Interfaces to the emulator hosting a playback session
//!
//! The playback controller never simulates anything itself. It drives the
//! host's run/pause state, asks it to serialize and restore full snapshots,
//! adjusts the replay window of queued replays, and reports events back.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::events::PlaybackEvent;
use crate::schedule::Frame;

/// Run state of the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Paused,
    Running,
}

/// CPU overclock setting of the emulated console
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overclock {
    pub enabled: bool,
    pub factor: f32,
}

impl Default for Overclock {
    fn default() -> Self {
        Self {
            enabled: false,
            factor: 1.0,
        }
    }
}

/// Run/pause control of the simulation
pub trait SimulationControl: Send + Sync {
    /// Pause the simulation
    ///
    /// Must return only once the simulation is parked between frames, so no
    /// `on_frame_advanced` call is in flight after it returns.
    fn pause(&self);

    /// Ask the simulation to pause after the frame in progress
    ///
    /// Returns immediately. Called from a thread other than the simulation
    /// thread while that thread may be blocked inside `on_frame_advanced`.
    fn request_pause(&self);

    /// Resume the simulation
    fn resume(&self);

    /// Current run state
    fn run_state(&self) -> RunState;

    /// Current overclock setting
    fn overclock(&self) -> Overclock;

    /// Apply an overclock setting
    fn set_overclock(&self, overclock: Overclock);
}

/// Full-state snapshot serialization
pub trait StateSerializer: Send + Sync {
    /// Serialize the complete simulation state
    fn capture_state(&self) -> Result<Vec<u8>>;

    /// Replace the simulation state with a previously captured snapshot
    fn restore_state(&self, state: &[u8]) -> Result<()>;
}

/// How the replay source feeds replays into the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayMode {
    /// A single replay file
    #[default]
    Normal,
    /// Following a replay as it is being written
    Mirror,
    /// A queue of replays, each with an optional start/end window
    Queue,
}

impl FromStr for ReplayMode {
    type Err = UnknownReplayMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "mirror" => Ok(Self::Mirror),
            "queue" => Ok(Self::Queue),
            other => Err(UnknownReplayMode(other.to_string())),
        }
    }
}

impl fmt::Display for ReplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Mirror => write!(f, "mirror"),
            Self::Queue => write!(f, "queue"),
        }
    }
}

/// Unrecognized replay mode string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown replay mode '{0}'")]
pub struct UnknownReplayMode(pub String);

/// Playback window of the current queued replay
///
/// `end == None` means the replay plays to its last frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameWindow {
    pub start: Frame,
    pub end: Option<Frame>,
}

/// Source of the replay being played
pub trait ReplaySource: Send + Sync {
    fn mode(&self) -> ReplayMode;

    fn window(&self) -> FrameWindow;

    fn set_window(&self, window: FrameWindow);
}

/// Receiver of playback events
///
/// Implementations must not block; events are informational only.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PlaybackEvent);
}

/// The set of host collaborators a session talks to
#[derive(Clone)]
pub struct HostBindings {
    pub simulation: Arc<dyn SimulationControl>,
    pub states: Arc<dyn StateSerializer>,
    pub source: Arc<dyn ReplaySource>,
    pub events: Arc<dyn EventSink>,
}
