//! Recorder configuration.
//!
//! Defaults reproduce the stock behaviour: ten retries starting at two
//! seconds, an equal-weight baseline, and ten saved frames per trigger.
//! A TOML file can override any field; it is only ever read.

use crate::capture::DEFAULT_STREAM_TIMEOUT;
use crate::connection::RetryPolicy;
use crate::detection::DetectionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Output and interaction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving saved frames. Must already exist.
    pub dir: PathBuf,
    /// JPEG quality (1-100).
    pub jpeg_quality: u8,
    /// Per-frame wait for an exit request, in milliseconds.
    pub poll_interval_ms: u64,
    /// Show frames in a window (requires the `opencv` feature).
    pub preview: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("images"),
            jpeg_quality: 95,
            poll_interval_ms: 30,
            preview: false,
        }
    }
}

impl OutputConfig {
    /// Returns the exit poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Stream input settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Seconds a source may stay silent, while opening or between frames,
    /// before the session is dropped and the reconnect loop takes over.
    pub stream_timeout_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            stream_timeout_secs: DEFAULT_STREAM_TIMEOUT.as_secs(),
        }
    }
}

impl CaptureConfig {
    /// Returns the stall timeout.
    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }
}

/// Complete recorder configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecorderConfig {
    /// Stream input settings.
    pub capture: CaptureConfig,
    /// Reconnect budget and backoff.
    pub retry: RetryPolicy,
    /// Baseline and trigger parameters.
    pub detection: DetectionConfig,
    /// Where and how frames are written.
    pub output: OutputConfig,
}

impl RecorderConfig {
    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_retries == 0 {
            return Err(ConfigError::NoRetries);
        }
        if let Some(ceiling) = self.retry.max_wait {
            if ceiling < self.retry.min_wait {
                return Err(ConfigError::InvalidBackoff);
            }
        }
        let alpha = self.detection.baseline_alpha;
        if self.capture.stream_timeout_secs == 0 {
            return Err(ConfigError::NoStreamTimeout);
        }
        if !(0.0..=1.0).contains(&alpha) {
            return Err(ConfigError::InvalidAlpha(alpha));
        }
        if !self.detection.score_threshold.is_finite() || self.detection.score_threshold < 0.0 {
            return Err(ConfigError::InvalidScoreThreshold);
        }
        if self.output.dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyOutputDir);
        }
        if !(1..=100).contains(&self.output.jpeg_quality) {
            return Err(ConfigError::InvalidQuality(self.output.jpeg_quality));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("max_retries must be at least 1")]
    NoRetries,
    #[error("max_wait must not be shorter than min_wait")]
    InvalidBackoff,
    #[error("stream_timeout_secs must be at least 1")]
    NoStreamTimeout,
    #[error("baseline_alpha {0} is outside 0..=1")]
    InvalidAlpha(f64),
    #[error("score_threshold must be a non-negative number")]
    InvalidScoreThreshold,
    #[error("output directory must not be empty")]
    EmptyOutputDir,
    #[error("jpeg_quality {0} is outside 1..=100")]
    InvalidQuality(u8),
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Retry section of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    /// Reconnect attempts between successful reads.
    pub max_retries: Option<u32>,
    /// First backoff wait, in seconds.
    pub min_wait_secs: Option<f64>,
    /// Backoff ceiling, in seconds.
    pub max_wait_secs: Option<f64>,
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// `[capture]` table.
    #[serde(default)]
    pub capture: CaptureConfig,
    /// `[retry]` table.
    #[serde(default)]
    pub retry: RetrySection,
    /// `[detection]` table.
    #[serde(default)]
    pub detection: DetectionConfig,
    /// `[output]` table.
    #[serde(default)]
    pub output: OutputConfig,
}

fn secs(value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| ConfigError::ParseError(format!("invalid wait {}: {}", value, e)))
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Converts into a validated recorder configuration.
    pub fn into_config(self) -> Result<RecorderConfig, ConfigError> {
        let config = self.resolve()?;
        config.validate()?;
        Ok(config)
    }

    /// Converts into a recorder configuration without validating it, so
    /// that further overrides can be applied first.
    pub fn resolve(self) -> Result<RecorderConfig, ConfigError> {
        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: self.retry.max_retries.unwrap_or(defaults.max_retries),
            min_wait: match self.retry.min_wait_secs {
                Some(value) => secs(value)?,
                None => defaults.min_wait,
            },
            max_wait: self.retry.max_wait_secs.map(secs).transpose()?,
        };

        Ok(RecorderConfig {
            capture: self.capture,
            retry,
            detection: self.detection,
            output: self.output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = RecorderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_retries, 10);
        assert_eq!(config.retry.min_wait, Duration::from_secs(2));
        assert_eq!(config.detection.trailing_frames, 10);
        assert_eq!(config.output.dir, PathBuf::from("images"));
    }

    #[test]
    fn test_alpha_out_of_range_invalid() {
        let mut config = RecorderConfig::default();
        config.detection.baseline_alpha = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidAlpha(_))));
    }

    #[test]
    fn test_zero_retries_invalid() {
        let mut config = RecorderConfig::default();
        config.retry.max_retries = 0;
        assert!(matches!(config.validate(), Err(ConfigError::NoRetries)));
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = FileConfig::from_toml("").unwrap().into_config().unwrap();
        assert_eq!(config, RecorderConfig::default());
    }

    #[test]
    fn test_partial_file_overrides() {
        let toml = r#"
            [retry]
            max_retries = 3
            min_wait_secs = 0.5
            max_wait_secs = 60.0

            [detection]
            score_threshold = 0.5

            [output]
            dir = "/var/lib/recorder"
        "#;

        let config = FileConfig::from_toml(toml).unwrap().into_config().unwrap();

        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.min_wait, Duration::from_millis(500));
        assert_eq!(config.retry.max_wait, Some(Duration::from_secs(60)));
        assert_eq!(config.detection.score_threshold, 0.5);
        assert_eq!(config.detection.pixel_threshold, 30);
        assert_eq!(config.output.dir, PathBuf::from("/var/lib/recorder"));
        assert_eq!(config.output.jpeg_quality, 95);
    }

    #[test]
    fn test_negative_wait_rejected() {
        let file = FileConfig::from_toml("[retry]\nmin_wait_secs = -1.0").unwrap();
        assert!(matches!(file.into_config(), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_resolve_defers_validation() {
        let file = FileConfig::from_toml("[retry]\nmax_retries = 0").unwrap();

        let mut config = file.clone().resolve().unwrap();
        assert_eq!(config.retry.max_retries, 0);
        assert!(matches!(file.into_config(), Err(ConfigError::NoRetries)));

        config.retry.max_retries = 3;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stream_timeout() {
        let config = FileConfig::from_toml("[capture]\nstream_timeout_secs = 5")
            .unwrap()
            .into_config()
            .unwrap();
        assert_eq!(config.capture.stream_timeout(), Duration::from_secs(5));
        assert_eq!(
            RecorderConfig::default().capture.stream_timeout(),
            Duration::from_secs(30)
        );

        let file = FileConfig::from_toml("[capture]\nstream_timeout_secs = 0").unwrap();
        assert!(matches!(file.into_config(), Err(ConfigError::NoStreamTimeout)));
    }

    #[test]
    fn test_malformed_file_rejected() {
        assert!(matches!(
            FileConfig::from_toml("[retry\nmax_retries = 3"),
            Err(ConfigError::ParseError(_))
        ));
    }
}
