//! Monitor configuration

use crate::channel::{SerialSettings, DEFAULT_BAUD_RATE};
use crate::error::MonitorError;
use crate::normalizer::DEFAULT_CLIP;
use crate::tracker::DEFAULT_DWELL_SECS;
use serde::{Deserialize, Serialize};

/// Default classification threshold; scores above it are good posture
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Settings for the live monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Serial device path or name
    pub port: String,
    pub baud_rate: u32,
    /// Per-read timeout (milliseconds)
    pub read_timeout_ms: u64,
    /// Wait after opening the port before reading (milliseconds)
    pub settle_delay_ms: u64,
    /// Continuous bad posture before an alert (seconds)
    pub dwell_secs: i64,
    pub threshold: f32,
    /// Standardized values are clipped to `[-clip, clip]`
    pub clip: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            port: "COM5".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: 1_000,
            settle_delay_ms: 2_000,
            dwell_secs: DEFAULT_DWELL_SECS,
            threshold: DEFAULT_THRESHOLD,
            clip: DEFAULT_CLIP,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.port.trim().is_empty() {
            return Err(MonitorError::InvalidConfig("port must not be empty".to_string()));
        }
        if self.baud_rate == 0 {
            return Err(MonitorError::InvalidConfig("baud rate must be positive".to_string()));
        }
        if self.read_timeout_ms == 0 {
            return Err(MonitorError::InvalidConfig(
                "read timeout must be positive".to_string(),
            ));
        }
        if self.dwell_secs <= 0 {
            return Err(MonitorError::InvalidConfig(format!(
                "dwell must be positive, got {}s",
                self.dwell_secs
            )));
        }
        if chrono::Duration::try_seconds(self.dwell_secs).is_none() {
            return Err(MonitorError::InvalidConfig(format!(
                "dwell of {}s is out of range",
                self.dwell_secs
            )));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(MonitorError::InvalidConfig(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if !(self.clip.is_finite() && self.clip > 0.0) {
            return Err(MonitorError::InvalidConfig(format!(
                "clip bound must be positive, got {}",
                self.clip
            )));
        }
        Ok(())
    }

    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            port: self.port.clone(),
            baud_rate: self.baud_rate,
            timeout_ms: self.read_timeout_ms,
        }
    }

    /// Dwell as a duration, saturating for values `validate` would reject
    pub fn dwell(&self) -> chrono::Duration {
        chrono::Duration::try_seconds(self.dwell_secs).unwrap_or(chrono::Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_device_setup() {
        let config = MonitorConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.read_timeout_ms, 1_000);
        assert_eq!(config.dwell_secs, 60);
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.clip, 3.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            MonitorConfig { dwell_secs: 0, ..Default::default() },
            MonitorConfig { dwell_secs: i64::MAX, ..Default::default() },
            MonitorConfig { threshold: 1.5, ..Default::default() },
            MonitorConfig { clip: -1.0, ..Default::default() },
            MonitorConfig { read_timeout_ms: 0, ..Default::default() },
            MonitorConfig { port: " ".to_string(), ..Default::default() },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(MonitorError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_dwell_out_of_range_saturates() {
        let config = MonitorConfig { dwell_secs: i64::MAX, ..Default::default() };
        assert_eq!(config.dwell(), chrono::Duration::MAX);
        assert_eq!(MonitorConfig::default().dwell(), chrono::Duration::seconds(60));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: MonitorConfig =
            serde_json::from_str(r#"{"port": "/dev/ttyUSB0", "dwell_secs": 30}"#).unwrap();
        assert_eq!(config.port, "/dev/ttyUSB0");
        assert_eq!(config.dwell_secs, 30);
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.serial_settings().timeout_ms, 1_000);
    }
}
