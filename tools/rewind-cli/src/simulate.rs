//! Play a synthetic replay and verify seeks

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail, ensure};
use clap::Args;
use tracing::info;

use rewind_core::synthetic::expected_state;
use rewind_core::{
    Frame, Lz4DeltaCodec, PlaybackConfig, PlaybackSession, ReplayMode, SimulationControl,
    SyntheticConsole, SyntheticSpec,
};

/// How long a single seek may take before the run is abandoned
const SEEK_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Args)]
pub struct SimulateArgs {
    /// Number of frames in the synthetic replay
    #[arg(long, default_value = "3000")]
    pub frames: i32,

    /// Frames to seek to, in order
    #[arg(long = "seek")]
    pub seeks: Vec<Frame>,

    /// Jump back once after the seeks
    #[arg(long)]
    pub jump_back: bool,

    /// Jump forward once after the seeks
    #[arg(long)]
    pub jump_forward: bool,

    /// Playback config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Seed for the synthetic console
    #[arg(long, default_value = "1")]
    pub seed: u64,

    /// Synthetic console memory size in bytes
    #[arg(long, default_value = "65536")]
    pub memory: usize,
}

/// A seek step to perform once the replay has played through
#[derive(Debug, Clone, Copy)]
enum Step {
    Seek(Frame),
    JumpBack,
    JumpForward,
}

impl Step {
    fn issue(self, session: &PlaybackSession) {
        match self {
            Step::Seek(frame) => session.set_seek_target(frame),
            Step::JumpBack => session.request_jump_back(),
            Step::JumpForward => session.request_jump_forward(),
        }
    }
}

fn steps(args: &SimulateArgs) -> Vec<Step> {
    let mut steps: Vec<Step> = args.seeks.iter().copied().map(Step::Seek).collect();
    if args.jump_back {
        steps.push(Step::JumpBack);
    }
    if args.jump_forward {
        steps.push(Step::JumpForward);
    }
    steps
}

pub fn execute(args: SimulateArgs) -> Result<()> {
    ensure!(args.frames > 0, "--frames must be positive");
    let config = crate::config::load(args.config.clone())?;
    let steps = steps(&args);

    let spec = SyntheticSpec {
        seed: args.seed,
        memory_size: args.memory,
        first_frame: config.game_first_frame,
        last_frame: config.game_first_frame + args.frames - 1,
    };
    println!("Simulating frames {} to {}", spec.first_frame, spec.last_frame);
    println!("  Save interval: {}", config.save_interval);
    println!("  First save: {}", config.first_save_frame);
    println!("  Memory: {} bytes", spec.memory_size);

    let console = SyntheticConsole::new(spec, ReplayMode::Normal);
    let result = run(&config, &console, &steps);
    console.shutdown();
    result
}

fn run(config: &PlaybackConfig, console: &Arc<SyntheticConsole>, steps: &[Step]) -> Result<()> {
    let session = Arc::new(
        PlaybackSession::new(
            config.clone(),
            console.bindings(),
            Arc::new(Lz4DeltaCodec::new()),
        )
        .context("Failed to create playback session")?,
    );
    session.start_session()?;
    console
        .attach(Arc::clone(&session))
        .context("Failed to start synthetic console")?;

    // Play the whole replay once so every interval snapshot exists
    let started = Instant::now();
    console.resume();
    console.wait_until_finished();
    console.pause();
    let elapsed = started.elapsed();

    if !session.is_in_playback() {
        session.reset_session();
        bail!(
            "Replay ended before the first save frame {}",
            config.first_save_frame
        );
    }

    let stats = session.store_stats();
    println!();
    println!("=== Playback ===");
    println!("Played to frame {} in {:.2?}", console.frame(), elapsed);
    println!("Base snapshot: {} bytes", stats.base_bytes);
    println!(
        "Diffs: {} ({} pending, {} bytes)",
        stats.diff_count, stats.pending, stats.compressed_bytes
    );

    if !steps.is_empty() {
        println!();
        println!("=== Seeks ===");
    }
    let mut failures = 0;
    for step in steps {
        let before = console.frame();
        let started = Instant::now();
        step.issue(&session);
        wait_for_seek(&session)?;

        let landed = console.frame();
        let matches = console.memory() == expected_state(console.spec(), landed);
        info!(?step, before, landed, matches, "Seek verified");
        println!(
            "{:?}: {} -> {} in {:.2?} [{}]",
            step,
            before,
            landed,
            started.elapsed(),
            if matches { "ok" } else { "MISMATCH" }
        );
        if !matches {
            failures += 1;
        }
    }

    session.reset_session();

    if failures > 0 {
        bail!("{failures} seek(s) landed on a state that differs from recomputation");
    }
    println!();
    println!("All {} seek(s) verified", steps.len());
    Ok(())
}

fn wait_for_seek(session: &PlaybackSession) -> Result<()> {
    let deadline = Instant::now() + SEEK_TIMEOUT;
    while session.is_seeking() {
        if Instant::now() >= deadline {
            bail!("Seek did not finish within {:?}", SEEK_TIMEOUT);
        }
        thread::sleep(session.config().poll_interval());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(frames: i32, seeks: Vec<Frame>) -> SimulateArgs {
        SimulateArgs {
            frames,
            seeks,
            jump_back: true,
            jump_forward: true,
            config: None,
            seed: 9,
            memory: 2048,
        }
    }

    #[test]
    fn test_steps_order() {
        let steps = steps(&args(10, vec![5, 3]));
        assert!(matches!(
            steps.as_slice(),
            [
                Step::Seek(5),
                Step::Seek(3),
                Step::JumpBack,
                Step::JumpForward
            ]
        ));
    }

    #[test]
    fn test_simulated_seeks_verify() {
        let config = PlaybackConfig {
            poll_interval_ms: 1,
            ..PlaybackConfig::default()
        };
        let args = args(2500, vec![400, 1700, 100]);
        let spec = SyntheticSpec {
            seed: args.seed,
            memory_size: args.memory,
            first_frame: config.game_first_frame,
            last_frame: config.game_first_frame + args.frames - 1,
        };
        let console = SyntheticConsole::new(spec, ReplayMode::Normal);
        let result = run(&config, &console, &steps(&args));
        console.shutdown();
        result.unwrap();
    }

    #[test]
    fn test_short_replay_never_reaches_playback() {
        let config = PlaybackConfig {
            poll_interval_ms: 1,
            ..PlaybackConfig::default()
        };
        let spec = SyntheticSpec {
            seed: 1,
            memory_size: 64,
            first_frame: config.game_first_frame,
            last_frame: config.game_first_frame,
        };
        let console = SyntheticConsole::new(spec, ReplayMode::Normal);
        let result = run(&config, &console, &[]);
        console.shutdown();
        assert!(result.is_err());
    }
}
