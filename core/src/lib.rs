//! Rewind Core - Seekable replay playback
//!
//! This crate adds seeking to a deterministic emulator playing back a
//! recorded replay. While the replay plays, full-state snapshots are taken at
//! a fixed frame interval and stored as compressed diffs against a base
//! snapshot. A seek restores the nearest stored snapshot and fast-forwards the
//! simulation to the exact target frame.
//!
//! # Architecture
//!
//! - [`PlaybackSession`] - Handle driven by the emulator; owns the background threads
//! - [`SnapshotStore`] - Base snapshot plus per-interval diffs, with an in-flight ceiling
//! - [`DeltaCodec`] - Diff encoding of a snapshot against the base
//! - [`SaveSchedule`] - Which frames are captured, and where a seek should resume
//! - [`HostBindings`] - The emulator-facing traits a session drives
//! - [`SyntheticConsole`] - Deterministic stand-in emulator for tests and tooling

pub mod config;
pub mod delta;
pub mod events;
pub mod host;
pub mod schedule;
pub mod session;
pub mod store;
pub mod synthetic;
#[cfg(test)]
pub mod test_utils;

// Re-export core traits and types
pub use config::{ConfigError, PlaybackConfig};
pub use delta::{CodecError, DeltaCodec, Lz4DeltaCodec};
pub use events::{LoadPoint, PlaybackEvent};
pub use host::{
    EventSink, FrameWindow, HostBindings, Overclock, ReplayMode, ReplaySource, RunState,
    SimulationControl, StateSerializer,
};
pub use schedule::{Frame, SaveSchedule};
pub use session::{
    PlaybackSession, PlaybackState, SeekError, SeekPlan, SeekRequest, SessionError, plan_seek,
};
pub use store::{DiffHandle, SnapshotStore, StoreError, StoreStats};
pub use synthetic::{SyntheticConsole, SyntheticSpec};
