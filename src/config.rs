//! Application configuration
//!
//! Loaded from a TOML file, by default
//! `~/.config/texnouz-roaming/config.toml`. Every section and key is
//! optional; a missing file yields the defaults.

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::aggregation::TieBreak;
use crate::domain::status::{AvailabilityStatus, HistoryLimits};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Default configuration file location
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("texnouz-roaming")
        .join("config.toml")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub status: StatusConfig,
    pub aggregation: AggregationConfig,
    pub reservations: ReservationConfig,
    pub events: EventsConfig,
}

impl AppConfig {
    /// Reads `path`; a missing file gives the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Writes the config, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error (or any `EnvFilter` directive)
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Status history bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub history_size: usize,
    /// 0 = unbounded
    pub history_max_age_secs: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            history_size: 50,
            history_max_age_secs: 0,
        }
    }
}

impl StatusConfig {
    pub fn history_limits(&self) -> HistoryLimits {
        HistoryLimits {
            max_len: self.history_size.max(1),
            max_age: (self.history_max_age_secs > 0).then(|| seconds(self.history_max_age_secs)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieBreakKind {
    #[default]
    Ordinal,
    Precedence,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub tie_break: TieBreakKind,
    /// Highest precedence first; only used with `tie_break = "precedence"`
    pub precedence: Vec<AvailabilityStatus>,
}

impl AggregationConfig {
    pub fn tie_break(&self) -> TieBreak<AvailabilityStatus> {
        match self.tie_break {
            TieBreakKind::Ordinal => TieBreak::Ordinal,
            TieBreakKind::Precedence => TieBreak::Precedence(self.precedence.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservationConfig {
    /// Used when a request does not name a duration
    pub default_duration_secs: u64,
    pub grace_period_secs: u64,
    pub sweep_interval_secs: u64,
    /// Released reservations older than this are evicted by the sweep
    pub retention_secs: u64,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            default_duration_secs: 900,
            grace_period_secs: 0,
            sweep_interval_secs: 60,
            retention_secs: 3600,
        }
    }
}

impl ReservationConfig {
    pub fn default_duration(&self) -> Duration {
        seconds(self.default_duration_secs)
    }

    pub fn grace_period(&self) -> Duration {
        seconds(self.grace_period_secs)
    }

    pub fn retention(&self) -> Duration {
        seconds(self.retention_secs)
    }

    /// Never zero; tokio intervals reject a zero period
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Saturates at `Duration::MAX` for values chrono cannot represent
fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub bus_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { bus_capacity: 1024 }
    }
}
