//! Playback events reported to the host

use crate::schedule::Frame;

/// Snapshot a seek resumed from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPoint {
    /// The base snapshot at the first save frame
    Base(Frame),
    /// An interval snapshot reconstructed from its diff
    Diff(Frame),
}

impl LoadPoint {
    pub fn frame(&self) -> Frame {
        match *self {
            Self::Base(frame) | Self::Diff(frame) => frame,
        }
    }
}

/// High-level playback events for the UI layer
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// A new frame was simulated (only when frame index display is enabled)
    FrameIndexChanged {
        frame: Frame,
    },
    /// The base snapshot was captured and seeking became available
    PlaybackReady {
        frame: Frame,
    },
    /// A seek started
    SeekStarted {
        /// Clamped seek destination
        target: Frame,
    },
    /// A seek completed
    SeekFinished {
        target: Frame,
        /// Snapshot the seek restored, if any
        loaded: Option<LoadPoint>,
        /// Whether hard fast-forward was needed to reach the target
        fast_forwarded: bool,
    },
    /// A seek could not restore a snapshot; playback state is unchanged
    SeekFailed {
        target: Frame,
        reason: String,
    },
}
