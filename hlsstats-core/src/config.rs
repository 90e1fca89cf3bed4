use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::sync::SyncMode;
use crate::timeout::{compute_timeout_ms, DEFAULT_TIME_PERIOD_FOR_VIEWER_COUNT_MS};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub logging: LoggingConfig,
    pub viewer_stats: ViewerStatsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Empty URL selects the in-memory stream store.
    pub url: String,
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            key_prefix: "hlsstats:".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Viewer tracking settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerStatsConfig {
    /// Raw HLS segment duration setting in seconds, as the media server has it.
    pub segment_duration: String,
    /// Interval between sweeps.
    pub sweep_period_ms: u64,
    /// Timeout used when `segment_duration` does not parse.
    pub timeout_fallback_ms: u64,
    pub sync_mode: SyncMode,
}

impl Default for ViewerStatsConfig {
    fn default() -> Self {
        Self {
            segment_duration: String::new(),
            sweep_period_ms: DEFAULT_TIME_PERIOD_FOR_VIEWER_COUNT_MS,
            timeout_fallback_ms: DEFAULT_TIME_PERIOD_FOR_VIEWER_COUNT_MS,
            sync_mode: SyncMode::default(),
        }
    }
}

impl ViewerStatsConfig {
    /// Staleness timeout derived from the segment duration.
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        compute_timeout_ms(&self.segment_duration, self.timeout_fallback_ms)
    }

    #[must_use]
    pub const fn sweep_period(&self) -> Duration {
        Duration::from_millis(self.sweep_period_ms)
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // HLSSTATS__VIEWER_STATS__SWEEP_PERIOD_MS, etc.
        builder = builder.add_source(
            Environment::with_prefix("HLSSTATS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Check for settings that cannot work. Returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.viewer_stats.sweep_period_ms == 0 {
            errors.push("viewer_stats.sweep_period_ms must be greater than zero".to_string());
        }
        if self.viewer_stats.timeout_fallback_ms == 0 {
            errors.push("viewer_stats.timeout_fallback_ms must be greater than zero".to_string());
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be \"json\" or \"pretty\", got \"{}\"",
                self.logging.format
            ));
        }
        if self.server.http_port == 0 {
            errors.push("server.http_port must be greater than zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }
}
