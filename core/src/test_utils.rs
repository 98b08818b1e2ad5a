//! Shared test utilities for unit tests

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::PlaybackConfig;
use crate::delta::{CodecError, DeltaCodec, Lz4DeltaCodec};
use crate::events::PlaybackEvent;
use crate::host::{ReplayMode, SimulationControl};
use crate::schedule::Frame;
use crate::session::PlaybackSession;
use crate::synthetic::{SyntheticConsole, SyntheticSpec, expected_state};

/// How long a test waits for background threads before failing
pub const TIMEOUT: Duration = Duration::from_secs(10);

/// Poll `condition` until it holds, panicking after [`TIMEOUT`]
pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

// ============================================================================
// Test Codecs
// ============================================================================

/// Codec whose `encode` blocks until a permit is released
#[derive(Default)]
pub struct GatedCodec {
    permits: Mutex<usize>,
    released: Condvar,
}

impl GatedCodec {
    pub fn release(&self, count: usize) {
        *self.permits.lock().unwrap() += count;
        self.released.notify_all();
    }
}

impl DeltaCodec for GatedCodec {
    fn encode(&self, base: &[u8], target: &[u8]) -> Result<Vec<u8>, CodecError> {
        let permits = self.permits.lock().unwrap();
        let mut permits = self
            .released
            .wait_while(permits, |permits| *permits == 0)
            .unwrap();
        *permits -= 1;
        drop(permits);
        Lz4DeltaCodec.encode(base, target)
    }

    fn decode(&self, base: &[u8], diff: &[u8]) -> Result<Vec<u8>, CodecError> {
        Lz4DeltaCodec.decode(base, diff)
    }
}

/// Codec that encodes normally but never decodes
pub struct UndecodableCodec;

impl DeltaCodec for UndecodableCodec {
    fn encode(&self, base: &[u8], target: &[u8]) -> Result<Vec<u8>, CodecError> {
        Lz4DeltaCodec.encode(base, target)
    }

    fn decode(&self, _base: &[u8], _diff: &[u8]) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::ChecksumMismatch)
    }
}

// ============================================================================
// Playback Harness
// ============================================================================

/// Config with a small first save frame and fast polling
pub fn test_config() -> PlaybackConfig {
    PlaybackConfig {
        first_save_frame: 2,
        game_first_frame: 0,
        poll_interval_ms: 1,
        ..PlaybackConfig::default()
    }
}

/// A started session driven by a paused synthetic console
pub struct Playback {
    pub console: Arc<SyntheticConsole>,
    pub session: Arc<PlaybackSession>,
}

impl Playback {
    pub fn start(config: PlaybackConfig) -> Self {
        Self::start_with(config, ReplayMode::Normal, Arc::new(Lz4DeltaCodec::new()))
    }

    pub fn start_with(config: PlaybackConfig, mode: ReplayMode, codec: Arc<dyn DeltaCodec>) -> Self {
        let spec = SyntheticSpec {
            seed: 0x5EED,
            memory_size: 4096,
            first_frame: config.game_first_frame,
            last_frame: config.game_first_frame - 1,
        };
        let console = SyntheticConsole::new(spec, mode);
        let session = Arc::new(PlaybackSession::new(config, console.bindings(), codec).unwrap());
        session.start_session().unwrap();
        console.attach(Arc::clone(&session)).unwrap();
        Self { console, session }
    }

    /// Let the console play up to `frame`, then pause it there
    pub fn run_to(&self, frame: Frame) {
        self.console.set_last_frame(frame);
        self.console.resume();
        self.wait_for_frame(frame);
        self.console.pause();
    }

    /// Wait until the console has finished `frame` and is idle
    pub fn wait_for_frame(&self, frame: Frame) {
        wait_until(&format!("console to reach frame {frame}"), || {
            self.console.frame() == frame && self.console.is_parked()
        });
    }

    /// Request a seek to `frame` and wait for it to complete
    pub fn seek(&self, frame: Frame) {
        self.session.set_seek_target(frame);
        self.wait_for_seek();
    }

    pub fn wait_for_seek(&self) {
        wait_until("seek to finish", || !self.session.is_seeking());
    }

    /// Assert the console memory matches a from-scratch simulation of `frame`
    pub fn assert_console_at(&self, frame: Frame) {
        assert_eq!(self.console.frame(), frame);
        assert!(
            self.console.memory() == expected_state(self.console.spec(), frame),
            "console memory diverged at frame {frame}"
        );
    }

    /// The last `SeekFinished` or `SeekFailed` event
    pub fn last_seek_outcome(&self) -> Option<PlaybackEvent> {
        self.console.events().into_iter().rev().find(|event| {
            matches!(
                event,
                PlaybackEvent::SeekFinished { .. } | PlaybackEvent::SeekFailed { .. }
            )
        })
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        self.session.reset_session();
        self.console.shutdown();
    }
}
