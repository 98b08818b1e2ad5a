//! Playback configuration (rewind.toml)
//!
//! Holds the snapshot cadence, seek and fast-forward tuning, and feature
//! toggles for a playback session. Stored as TOML; every field has a default so
//! partial files are accepted.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::schedule::{Frame, SaveSchedule};

/// Frames between scheduled snapshot captures (15 seconds at 60fps)
pub const DEFAULT_SAVE_INTERVAL: i32 = 900;

/// First frame of a recorded game
pub const GAME_FIRST_FRAME: Frame = -123;

/// Frame on which the base snapshot is captured
pub const PLAYBACK_FIRST_SAVE: Frame = -122;

/// Diff computations allowed in flight before producers block
pub const DEFAULT_MAX_IN_FLIGHT_DIFFS: usize = 3;

/// Frames skipped by a single jump request (5 seconds at 60fps)
pub const DEFAULT_JUMP_INTERVAL: i32 = 300;

/// Minimum frames between two soft fast-forward frames
pub const DEFAULT_SOFT_FFW_THROTTLE: i32 = 15;

/// Sleep between background loop iterations
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 8;

/// CPU overclock factor applied while hard fast-forwarding
pub const DEFAULT_FFW_OVERCLOCK: f32 = 4.0;

/// Playback session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Frames between snapshot captures (default: 900)
    #[serde(default = "default_save_interval")]
    pub save_interval: i32,
    /// Frame the base snapshot is taken on (default: -122)
    #[serde(default = "default_first_save_frame")]
    pub first_save_frame: Frame,
    /// First frame of the game, used for replay window bounds (default: -123)
    #[serde(default = "default_game_first_frame")]
    pub game_first_frame: Frame,
    /// Diff computations allowed in flight (default: 3)
    #[serde(default = "default_max_in_flight_diffs")]
    pub max_in_flight_diffs: usize,
    /// Frames moved by a jump forward/back request (default: 300)
    #[serde(default = "default_jump_interval")]
    pub jump_interval: i32,
    /// Minimum frames between soft fast-forward frames (default: 15)
    #[serde(default = "default_soft_ffw_throttle")]
    pub soft_fast_forward_throttle: i32,
    /// Background loop sleep in milliseconds (default: 8)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Overclock factor used during hard fast-forward (default: 4.0)
    #[serde(default = "default_ffw_overclock")]
    pub fast_forward_overclock: f32,
    /// Whether interval snapshots are captured for the seek bar (default: true)
    #[serde(default = "default_true")]
    pub seekbar_enabled: bool,
    /// Whether frame index events are emitted every frame (default: false)
    #[serde(default)]
    pub show_frame_index: bool,
}

fn default_save_interval() -> i32 {
    DEFAULT_SAVE_INTERVAL
}
fn default_first_save_frame() -> Frame {
    PLAYBACK_FIRST_SAVE
}
fn default_game_first_frame() -> Frame {
    GAME_FIRST_FRAME
}
fn default_max_in_flight_diffs() -> usize {
    DEFAULT_MAX_IN_FLIGHT_DIFFS
}
fn default_jump_interval() -> i32 {
    DEFAULT_JUMP_INTERVAL
}
fn default_soft_ffw_throttle() -> i32 {
    DEFAULT_SOFT_FFW_THROTTLE
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_ffw_overclock() -> f32 {
    DEFAULT_FFW_OVERCLOCK
}
fn default_true() -> bool {
    true
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            save_interval: DEFAULT_SAVE_INTERVAL,
            first_save_frame: PLAYBACK_FIRST_SAVE,
            game_first_frame: GAME_FIRST_FRAME,
            max_in_flight_diffs: DEFAULT_MAX_IN_FLIGHT_DIFFS,
            jump_interval: DEFAULT_JUMP_INTERVAL,
            soft_fast_forward_throttle: DEFAULT_SOFT_FFW_THROTTLE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            fast_forward_overclock: DEFAULT_FFW_OVERCLOCK,
            seekbar_enabled: true,
            show_frame_index: false,
        }
    }
}

impl PlaybackConfig {
    /// Snapshot cadence derived from this config
    pub fn schedule(&self) -> SaveSchedule {
        SaveSchedule::new(self.first_save_frame, self.save_interval)
    }

    /// Sleep between background loop iterations
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Check that the values can drive a session
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.save_interval <= 0 {
            return Err(ConfigError::Invalid {
                field: "save_interval",
                reason: "must be positive".to_string(),
            });
        }
        if self.max_in_flight_diffs == 0 {
            return Err(ConfigError::Invalid {
                field: "max_in_flight_diffs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.jump_interval <= 0 {
            return Err(ConfigError::Invalid {
                field: "jump_interval",
                reason: "must be positive".to_string(),
            });
        }
        if self.soft_fast_forward_throttle < 0 {
            return Err(ConfigError::Invalid {
                field: "soft_fast_forward_throttle",
                reason: "must not be negative".to_string(),
            });
        }
        if !(self.fast_forward_overclock.is_finite() && self.fast_forward_overclock > 0.0) {
            return Err(ConfigError::Invalid {
                field: "fast_forward_overclock",
                reason: "must be a positive factor".to_string(),
            });
        }
        if self.game_first_frame > self.first_save_frame {
            return Err(ConfigError::Invalid {
                field: "game_first_frame",
                reason: "must not be after first_save_frame".to_string(),
            });
        }
        Ok(())
    }

    /// Default config file location (`<config dir>/rewind.toml`)
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "rewind", "rewind")
            .map(|dirs| dirs.config_dir().join("rewind.toml"))
    }

    /// Load config from a TOML file, falling back to defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save config as TOML, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Error loading, saving or validating a playback config
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = PlaybackConfig::default();
        assert_eq!(config.save_interval, 900);
        assert_eq!(config.first_save_frame, -122);
        assert_eq!(config.max_in_flight_diffs, 3);
        assert_eq!(config.jump_interval, 300);
        assert_eq!(config.soft_fast_forward_throttle, 15);
        assert_eq!(config.poll_interval(), Duration::from_millis(8));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PlaybackConfig = toml::from_str("save_interval = 600\n").unwrap();
        assert_eq!(config.save_interval, 600);
        assert_eq!(config.jump_interval, DEFAULT_JUMP_INTERVAL);
        assert!(config.seekbar_enabled);
        assert!(!config.show_frame_index);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("rewind.toml");

        let config = PlaybackConfig {
            save_interval: 450,
            show_frame_index: true,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = PlaybackConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = PlaybackConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, PlaybackConfig::default());
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rewind.toml");
        std::fs::write(&path, "save_interval = 0\n").unwrap();

        let err = PlaybackConfig::load(&path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "save_interval",
                ..
            }
        ));
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rewind.toml");
        std::fs::write(&path, "save_interval = \"often\"\n").unwrap();

        assert!(matches!(
            PlaybackConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_ceiling() {
        let config = PlaybackConfig {
            max_in_flight_diffs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
