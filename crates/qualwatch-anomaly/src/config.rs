//! Configuration parsing for the quality pipeline
//!
//! Every field has a default, so an empty file (or no file) is a valid config.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

// Main config structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QualwatchConfig {
    pub detection: DetectionConfig,
    pub window: WindowConfig,
    pub dedup: DedupConfig,
    pub runtime: RuntimeConfig,
    pub nats: NatsConfig,
    pub clickhouse: ClickHouseConfig,
    pub notify: NotifyConfig,
    pub slack: SlackConfig,
}

// thresholds for the anomaly checks
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    // shared by the z-score and MAD checks
    #[serde(alias = "zThreshold")]
    pub z_threshold: f64,

    // coverage floor
    #[serde(alias = "covMin")]
    pub cov_min: f64,

    #[serde(alias = "gapsMax")]
    pub gaps_max: u32,

    #[serde(alias = "overlapsMax")]
    pub overlaps_max: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            z_threshold: 2.5,
            cov_min: 0.9,
            gaps_max: 10,
            overlaps_max: 8,
        }
    }
}

// sliding window geometry (all in seconds)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    #[serde(alias = "windowSize")]
    pub size_seconds: u64,

    #[serde(alias = "windowPeriod")]
    pub period_seconds: u64,

    // how long past its end a window keeps accepting events
    pub allowed_lateness_seconds: u64,

    // how often partitions look for windows to close
    pub close_check_interval_seconds: u64,

    // events dated further ahead of processing time are rejected
    pub max_future_skew_seconds: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            size_seconds: 900,
            period_seconds: 300,
            allowed_lateness_seconds: 0,
            close_check_interval_seconds: 5,
            max_future_skew_seconds: 21_600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    #[serde(alias = "dedupTtl")]
    pub ttl_seconds: u64,

    // hard cap on remembered keys; oldest go first
    pub max_keys: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 3600,
            max_keys: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    // number of team partitions (one task each)
    pub partitions: usize,

    // bounded queue size per partition
    pub channel_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            partitions: 4,
            channel_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    pub url: String,
    pub events_subject: String,
    pub backfill_subject: String,
    pub alerts_subject: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "localhost:4222".to_string(),
            events_subject: "quality.events".to_string(),
            backfill_subject: "quality.backfill".to_string(),
            alerts_subject: "quality.anomalies".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClickHouseConfig {
    pub url: String,
    pub database: String,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            database: "qualwatch".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    // repeat alerts for the same team/window/types are muted this long
    pub cooldown_minutes: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self { cooldown_minutes: 5 }
    }
}

// Slack webhook config
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub enabled: bool,
    pub webhook_url: String,
}

impl QualwatchConfig {
    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detection;
        if !d.z_threshold.is_finite() || d.z_threshold <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "detection.z_threshold must be a positive number, got {}",
                d.z_threshold
            )));
        }
        if !(0.0..=1.0).contains(&d.cov_min) {
            return Err(ConfigError::Invalid(format!(
                "detection.cov_min must be within [0, 1], got {}",
                d.cov_min
            )));
        }

        let w = &self.window;
        if w.period_seconds == 0 {
            return Err(ConfigError::Invalid("window.period_seconds must be > 0".into()));
        }
        if w.size_seconds == 0 || w.size_seconds % w.period_seconds != 0 {
            return Err(ConfigError::Invalid(format!(
                "window.size_seconds ({}) must be a positive multiple of window.period_seconds ({})",
                w.size_seconds, w.period_seconds
            )));
        }
        if w.close_check_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "window.close_check_interval_seconds must be > 0".into(),
            ));
        }

        if self.dedup.ttl_seconds == 0 || self.dedup.max_keys == 0 {
            return Err(ConfigError::Invalid(
                "dedup.ttl_seconds and dedup.max_keys must be > 0".into(),
            ));
        }
        if self.runtime.partitions == 0 || self.runtime.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "runtime.partitions and runtime.channel_capacity must be > 0".into(),
            ));
        }
        if self.slack.enabled && self.slack.webhook_url.is_empty() {
            return Err(ConfigError::Invalid(
                "slack.webhook_url is required when slack is enabled".into(),
            ));
        }
        Ok(())
    }
}

/// Parse and validate configuration from TOML text
pub fn parse_config(content: &str) -> Result<QualwatchConfig, ConfigError> {
    let config: QualwatchConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<QualwatchConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}
