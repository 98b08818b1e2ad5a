//! Deterministic synthetic console
//!
//! A stand-in emulator for exercising playback sessions without a real core.
//! Its memory evolves deterministically from a seed, so the state at any
//! frame can be recomputed from scratch and compared against a snapshot the
//! session restored. It runs its own simulation thread and implements every
//! host trait the session needs.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use anyhow::{Result, bail};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use tracing::{debug, trace};

use crate::events::PlaybackEvent;
use crate::host::{
    EventSink, FrameWindow, HostBindings, Overclock, ReplayMode, ReplaySource, RunState,
    SimulationControl, StateSerializer,
};
use crate::schedule::Frame;
use crate::session::PlaybackSession;

/// Bytes each frame rewrites
const WRITES_PER_FRAME: usize = 16;

/// Size of the frame header at the start of memory
const HEADER: usize = 4;

/// Synthetic console parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticSpec {
    pub seed: u64,
    pub memory_size: usize,
    /// First frame the console simulates
    pub first_frame: Frame,
    /// Last frame of the synthetic replay
    pub last_frame: Frame,
}

/// Memory of the synthetic console; the first four bytes hold the frame
#[derive(Debug, Clone, PartialEq, Eq)]
struct World {
    frame: Frame,
    memory: Vec<u8>,
}

impl World {
    fn new(spec: &SyntheticSpec) -> Self {
        let mut rng = Pcg32::seed_from_u64(spec.seed);
        let mut memory = vec![0u8; spec.memory_size.max(HEADER + 1)];
        rng.fill(&mut memory[HEADER..]);
        let frame = spec.first_frame - 1;
        memory[..HEADER].copy_from_slice(&frame.to_le_bytes());
        Self { frame, memory }
    }

    fn step(&mut self, seed: u64) {
        self.frame += 1;
        let mut rng = Pcg32::seed_from_u64(seed ^ (self.frame as u32 as u64).rotate_left(32));
        let len = self.memory.len();
        for _ in 0..WRITES_PER_FRAME {
            let index = rng.random_range(HEADER..len);
            // Depend on prior contents so every frame matters
            let previous = self.memory[index];
            self.memory[index] = previous.rotate_left(3) ^ rng.random::<u8>();
        }
        self.memory[..HEADER].copy_from_slice(&self.frame.to_le_bytes());
    }

    fn from_bytes(bytes: &[u8], expected_len: usize) -> Result<Self> {
        if bytes.len() != expected_len {
            bail!(
                "snapshot is {} bytes, console memory is {expected_len}",
                bytes.len()
            );
        }
        let mut header = [0u8; HEADER];
        header.copy_from_slice(&bytes[..HEADER]);
        Ok(Self {
            frame: Frame::from_le_bytes(header),
            memory: bytes.to_vec(),
        })
    }
}

/// Recompute the synthetic console memory at `frame`
pub fn expected_state(spec: &SyntheticSpec, frame: Frame) -> Vec<u8> {
    let mut world = World::new(spec);
    while world.frame < frame {
        world.step(spec.seed);
    }
    world.memory
}

#[derive(Debug)]
struct Control {
    paused: bool,
    parked: bool,
    alive: bool,
    last_frame: Frame,
}

struct Inner {
    spec: SyntheticSpec,
    world: Mutex<World>,
    control: Mutex<Control>,
    changed: Condvar,
    overclock: Mutex<Overclock>,
    overclock_history: Mutex<Vec<Overclock>>,
    mode: ReplayMode,
    window: Mutex<FrameWindow>,
    events: Mutex<Vec<PlaybackEvent>>,
    restores: Mutex<Vec<Frame>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn at_end(&self, control: &Control) -> bool {
        lock(&self.world).frame >= control.last_frame
    }
}

/// Deterministic console driving a [`PlaybackSession`] from its own thread
pub struct SyntheticConsole {
    inner: Arc<Inner>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl SyntheticConsole {
    /// Create a paused console
    pub fn new(spec: SyntheticSpec, mode: ReplayMode) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(Inner {
                world: Mutex::new(World::new(&spec)),
                control: Mutex::new(Control {
                    paused: true,
                    parked: true,
                    alive: true,
                    last_frame: spec.last_frame,
                }),
                changed: Condvar::new(),
                overclock: Mutex::new(Overclock::default()),
                overclock_history: Mutex::new(Vec::new()),
                mode,
                window: Mutex::new(FrameWindow {
                    start: spec.first_frame,
                    end: None,
                }),
                events: Mutex::new(Vec::new()),
                restores: Mutex::new(Vec::new()),
                spec,
            }),
            thread: Mutex::new(None),
        })
    }

    pub fn spec(&self) -> &SyntheticSpec {
        &self.inner.spec
    }

    /// Host bindings backed by this console
    pub fn bindings(self: &Arc<Self>) -> HostBindings {
        HostBindings {
            simulation: self.clone(),
            states: self.clone(),
            source: self.clone(),
            events: self.clone(),
        }
    }

    /// Start the simulation thread, reporting frames to `session`
    ///
    /// The console stays paused until [`resume`](SimulationControl::resume).
    pub fn attach(&self, session: Arc<PlaybackSession>) -> std::io::Result<()> {
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("synthetic-console".into())
            .spawn(move || run(inner, session))?;
        *lock(&self.thread) = Some(handle);
        Ok(())
    }

    /// Stop the simulation thread and wait for it to exit
    pub fn shutdown(&self) {
        lock(&self.inner.control).alive = false;
        self.inner.changed.notify_all();
        if let Some(handle) = lock(&self.thread).take()
            && handle.thread().id() != thread::current().id()
        {
            let _ = handle.join();
        }
    }

    /// Frame the console memory is currently at
    pub fn frame(&self) -> Frame {
        lock(&self.inner.world).frame
    }

    /// Whether the simulation thread is idle between frames
    pub fn is_parked(&self) -> bool {
        lock(&self.inner.control).parked
    }

    /// Full memory image
    pub fn memory(&self) -> Vec<u8> {
        lock(&self.inner.world).memory.clone()
    }

    /// Extend or shorten the synthetic replay
    pub fn set_last_frame(&self, frame: Frame) {
        lock(&self.inner.control).last_frame = frame;
        self.inner.changed.notify_all();
    }

    /// Block until the console is parked at its last frame
    pub fn wait_until_finished(&self) {
        let inner = &self.inner;
        let control = lock(&inner.control);
        let _parked = inner
            .changed
            .wait_while(control, |control| {
                control.alive && !(control.parked && inner.at_end(control))
            })
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Events emitted so far
    pub fn events(&self) -> Vec<PlaybackEvent> {
        lock(&self.inner.events).clone()
    }

    /// Frames of every snapshot restored so far
    pub fn restores(&self) -> Vec<Frame> {
        lock(&self.inner.restores).clone()
    }

    /// Every overclock setting applied so far
    pub fn overclock_history(&self) -> Vec<Overclock> {
        lock(&self.inner.overclock_history).clone()
    }
}

impl Drop for SyntheticConsole {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(inner: Arc<Inner>, session: Arc<PlaybackSession>) {
    debug!("Synthetic console thread started");

    loop {
        {
            let mut control = lock(&inner.control);
            control.parked = true;
            inner.changed.notify_all();
            let mut control = inner
                .changed
                .wait_while(control, |control| {
                    control.alive && (control.paused || inner.at_end(control))
                })
                .unwrap_or_else(PoisonError::into_inner);
            if !control.alive {
                break;
            }
            control.parked = false;
        }

        let frame = {
            let mut world = lock(&inner.world);
            world.step(inner.spec.seed);
            world.frame
        };
        trace!(frame, "Simulated frame");
        session.on_frame_advanced(frame);
    }

    debug!("Synthetic console thread finished");
}

impl SimulationControl for SyntheticConsole {
    fn pause(&self) {
        let inner = &self.inner;
        let mut control = lock(&inner.control);
        control.paused = true;
        inner.changed.notify_all();
        let _parked = inner
            .changed
            .wait_while(control, |control| control.alive && !control.parked)
            .unwrap_or_else(PoisonError::into_inner);
    }

    fn request_pause(&self) {
        lock(&self.inner.control).paused = true;
        self.inner.changed.notify_all();
    }

    fn resume(&self) {
        lock(&self.inner.control).paused = false;
        self.inner.changed.notify_all();
    }

    fn run_state(&self) -> RunState {
        if lock(&self.inner.control).paused {
            RunState::Paused
        } else {
            RunState::Running
        }
    }

    fn overclock(&self) -> Overclock {
        *lock(&self.inner.overclock)
    }

    fn set_overclock(&self, overclock: Overclock) {
        *lock(&self.inner.overclock) = overclock;
        lock(&self.inner.overclock_history).push(overclock);
    }
}

impl StateSerializer for SyntheticConsole {
    fn capture_state(&self) -> Result<Vec<u8>> {
        Ok(lock(&self.inner.world).memory.clone())
    }

    fn restore_state(&self, state: &[u8]) -> Result<()> {
        let expected_len = lock(&self.inner.world).memory.len();
        let world = World::from_bytes(state, expected_len)?;
        debug!(frame = world.frame, "Restoring synthetic console state");
        lock(&self.inner.restores).push(world.frame);
        *lock(&self.inner.world) = world;
        self.inner.changed.notify_all();
        Ok(())
    }
}

impl ReplaySource for SyntheticConsole {
    fn mode(&self) -> ReplayMode {
        self.inner.mode
    }

    fn window(&self) -> FrameWindow {
        *lock(&self.inner.window)
    }

    fn set_window(&self, window: FrameWindow) {
        *lock(&self.inner.window) = window;
    }
}

impl EventSink for SyntheticConsole {
    fn emit(&self, event: PlaybackEvent) {
        lock(&self.inner.events).push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> SyntheticSpec {
        SyntheticSpec {
            seed: 42,
            memory_size: 512,
            first_frame: -123,
            last_frame: 100,
        }
    }

    #[test]
    fn test_expected_state_is_deterministic() {
        assert_eq!(expected_state(&spec(), 50), expected_state(&spec(), 50));
        assert_ne!(expected_state(&spec(), 50), expected_state(&spec(), 51));
    }

    #[test]
    fn test_state_header_holds_frame() {
        let len = spec().memory_size;
        for frame in [-123, 77] {
            let world = World::from_bytes(&expected_state(&spec(), frame), len).unwrap();
            assert_eq!(world.frame, frame);
        }
        assert!(World::from_bytes(&[1, 2], len).is_err());
    }

    #[test]
    fn test_restore_rejects_wrong_size() {
        let console = SyntheticConsole::new(spec(), ReplayMode::Normal);
        assert!(console.restore_state(&[0u8; 12]).is_err());
    }

    #[test]
    fn test_restore_replaces_memory() {
        let console = SyntheticConsole::new(spec(), ReplayMode::Normal);
        let state = expected_state(&spec(), 10);
        console.restore_state(&state).unwrap();
        assert_eq!(console.frame(), 10);
        assert_eq!(console.memory(), state);
        assert_eq!(console.restores(), vec![10]);
    }
}
