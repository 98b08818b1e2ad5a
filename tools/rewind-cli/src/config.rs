//! Config file commands

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Subcommand;

use rewind_core::PlaybackConfig;

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write the default config
    Init {
        /// Config file (defaults to the platform config directory)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the config a session would use
    Show {
        /// Config file (defaults to the platform config directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

pub fn execute(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init { path, force } => init(&resolve_path(path)?, force),
        ConfigAction::Show { path } => show(path),
    }
}

/// Explicit path, or the platform default
pub fn resolve_path(path: Option<PathBuf>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path),
        None => PlaybackConfig::default_path()
            .context("Could not determine the config directory; pass --path"),
    }
}

/// Load the config at `path`, or the default location when absent
pub fn load(path: Option<PathBuf>) -> Result<PlaybackConfig> {
    match path {
        Some(path) => PlaybackConfig::load(&path)
            .with_context(|| format!("Failed to load config: {}", path.display())),
        None => match PlaybackConfig::default_path() {
            Some(path) => PlaybackConfig::load(&path)
                .with_context(|| format!("Failed to load config: {}", path.display())),
            None => Ok(PlaybackConfig::default()),
        },
    }
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    PlaybackConfig::default()
        .save(path)
        .with_context(|| format!("Failed to write config: {}", path.display()))?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

fn show(path: Option<PathBuf>) -> Result<()> {
    let config = load(path)?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
