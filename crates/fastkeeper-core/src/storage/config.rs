//! TOML-based engine configuration.
//!
//! Stores:
//! - Detector tick interval and snapshot rate limit
//! - How long a completed session stays on the live display
//! - The UTC offset that defines calendar days for streaks
//! - The session type offered by default
//!
//! Configuration is stored at `~/.config/fastkeeper/config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;
use crate::session::SessionType;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Completion detector tick interval.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Minimum spacing between tick snapshots pushed to the live display.
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
    /// Seconds a completed session stays visible on the live display.
    #[serde(default = "default_completion_linger_secs")]
    pub completion_linger_secs: u64,
    /// Offset from UTC, in minutes, used to bucket streak days.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_session_type")]
    pub default_session_type: SessionType,
}

/// Upper bound for `completion_linger_secs` (one week).
pub const MAX_COMPLETION_LINGER_SECS: u64 = 7 * 24 * 3600;

fn default_tick_interval_ms() -> u64 {
    1_000
}
fn default_snapshot_interval_ms() -> u64 {
    1_000
}
fn default_completion_linger_secs() -> u64 {
    5 * 60
}
fn default_session_type() -> SessionType {
    SessionType::Intermittent16_8
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            snapshot_interval_ms: default_snapshot_interval_ms(),
            completion_linger_secs: default_completion_linger_secs(),
            utc_offset_minutes: 0,
            default_session_type: default_session_type(),
        }
    }
}

impl EngineConfig {
    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if !path.exists() {
            let cfg = Self::default();
            cfg.save_to(&path)?;
            return Ok(cfg);
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let cfg: EngineConfig = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "tick_interval_ms".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.completion_linger_secs > MAX_COMPLETION_LINGER_SECS {
            return Err(ConfigError::InvalidValue {
                key: "completion_linger_secs".into(),
                message: format!("must be at most {MAX_COMPLETION_LINGER_SECS}"),
            });
        }
        self.streak_offset().map(|_| ())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms)
    }

    pub fn completion_linger(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.completion_linger_secs.min(i64::MAX as u64) as i64)
    }

    pub fn streak_offset(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60)).ok_or_else(|| {
            ConfigError::InvalidValue {
                key: "utc_offset_minutes".into(),
                message: format!("{} is outside -1439..=1439", self.utc_offset_minutes),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: EngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let parsed: EngineConfig = toml::from_str("utc_offset_minutes = -300").unwrap();
        assert_eq!(parsed.tick_interval_ms, 1_000);
        assert_eq!(parsed.completion_linger_secs, 300);
        assert_eq!(parsed.default_session_type, SessionType::Intermittent16_8);
        assert_eq!(
            parsed.streak_offset().unwrap(),
            FixedOffset::west_opt(5 * 3600).unwrap()
        );
    }

    #[test]
    fn out_of_range_offset_is_rejected() {
        let cfg = EngineConfig {
            utc_offset_minutes: 24 * 60,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn save_and_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = EngineConfig {
            tick_interval_ms: 250,
            default_session_type: SessionType::Water,
            ..Default::default()
        };
        cfg.save_to(&path).unwrap();
        assert_eq!(EngineConfig::load_from(&path).unwrap(), cfg);
    }

    #[test]
    fn oversized_linger_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "completion_linger_secs = 100000000000000").unwrap();
        assert!(matches!(
            EngineConfig::load_from(&path),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "completion_linger_secs"
        ));

        let at_bound = EngineConfig {
            completion_linger_secs: MAX_COMPLETION_LINGER_SECS,
            ..Default::default()
        };
        assert!(at_bound.validate().is_ok());
    }

    #[test]
    fn zero_tick_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "tick_interval_ms = 0").unwrap();
        assert!(EngineConfig::load_from(&path).is_err());
    }
}
