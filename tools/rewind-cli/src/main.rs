//! Rewind CLI - Exercise seekable replay playback
//!
//! # Commands
//!
//! - `rewind config init` - Write the default playback config
//! - `rewind config show` - Print the effective playback config
//! - `rewind simulate` - Play a synthetic replay, seek around, verify every landing
//! - `rewind codec` - Diff two snapshot files and check the round trip
//!
//! # Usage
//!
//! ```bash
//! # Play 5000 frames, then seek back twice and jump forward
//! rewind simulate --frames 5000 --seek 500 --seek 2400 --jump-forward
//!
//! # Inspect how well two dumps diff
//! rewind codec --base before.bin --target after.bin
//! ```

mod codec;
mod config;
mod simulate;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Rewind CLI - Exercise seekable replay playback
#[derive(Parser)]
#[command(name = "rewind")]
#[command(about = "Exercise seekable replay playback")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the playback config file
    #[command(subcommand)]
    Config(config::ConfigAction),

    /// Play a synthetic replay and verify seeks against recomputation
    Simulate(simulate::SimulateArgs),

    /// Diff two snapshot files and verify the round trip
    Codec(codec::CodecArgs),
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config(action) => config::execute(action),
        Commands::Simulate(args) => simulate::execute(args),
        Commands::Codec(args) => codec::execute(args),
    }
}
