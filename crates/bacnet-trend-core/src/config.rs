//! Device configuration.
//!
//! Everything that was fixed at setup time in the device (identity, trend log
//! sizing, polling cadence, backup locations) lives in one serde-backed
//! structure. Every field has a default so a partial JSON document, or no
//! document at all, yields a working device.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration document is not valid JSON for this schema.
    #[error("Invalid configuration data: {0}")]
    InvalidData(#[from] serde_json::Error),

    /// A value is syntactically fine but unusable.
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Top level device configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceConfig {
    /// Device object name.
    pub device_name: String,
    /// Device object instance.
    pub device_instance: u32,
    pub model_name: String,
    pub description: String,
    pub vendor_identifier: u32,
    pub vendor_name: String,

    /// UDP port the BACnet/IP transport binds to.
    pub bacnet_port: u16,
    /// Local address the transport binds to.
    pub bind_address: String,
    /// Cadence of one cooperative loop iteration.
    pub loop_interval_ms: u64,

    /// Largest payload a trend log record may carry.
    pub max_payload_len: usize,
    pub trend_log: TrendLogSettings,
    pub trend_log_multiple: TrendLogSettings,

    /// Fixed file a trend log is preloaded from at startup.
    pub trend_log_backup_path: PathBuf,
    /// Fixed file a trend log multiple is preloaded from at startup.
    pub trend_log_multiple_backup_path: PathBuf,
    /// Directory new backups are written to.
    pub backup_directory: PathBuf,
}

/// Sizing and polling for one trend log object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendLogSettings {
    pub instance: u32,
    pub name: String,
    /// Ring buffer capacity in records.
    pub capacity: usize,
    pub poll_interval_ms: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_name: "Example Trending Device".to_string(),
            device_instance: 389000,
            model_name: "bacnet-trend-server".to_string(),
            description: "Example device to demonstrate import and export of trend log data"
                .to_string(),
            vendor_identifier: 389,
            vendor_name: "Chipkin Automation Systems".to_string(),
            bacnet_port: 47808,
            bind_address: "0.0.0.0".to_string(),
            loop_interval_ms: 10,
            max_payload_len: 256,
            trend_log: TrendLogSettings {
                instance: 10,
                name: "TL - Trend Log (AI1)".to_string(),
                capacity: 100,
                poll_interval_ms: 3000,
                enabled: true,
            },
            trend_log_multiple: TrendLogSettings {
                instance: 20,
                name: "TLM - Trend Log Multiple (AI1, AI2, BI3, MSI4)".to_string(),
                capacity: 100,
                poll_interval_ms: 3000,
                enabled: true,
            },
            trend_log_backup_path: PathBuf::from("trendLogBackupExample.txt"),
            trend_log_multiple_backup_path: PathBuf::from("trendLogMultipleBackupExample.txt"),
            backup_directory: PathBuf::from("."),
        }
    }
}

impl Default for TrendLogSettings {
    fn default() -> Self {
        DeviceConfig::default().trend_log
    }
}

impl DeviceConfig {
    /// Parse a JSON document, filling unspecified fields with defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&json)?;
        debug!(path = %path.display(), device = config.device_instance, "Configuration loaded");
        Ok(config)
    }

    /// Reject values the trend log store cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_payload_len == 0 {
            return Err(ConfigError::InvalidValue {
                field: "maxPayloadLen",
                reason: "must be greater than zero".to_string(),
            });
        }
        for (field, log) in [
            ("trendLog", &self.trend_log),
            ("trendLogMultiple", &self.trend_log_multiple),
        ] {
            if log.capacity == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "capacity must be greater than zero".to_string(),
                });
            }
            if log.poll_interval_ms == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "pollIntervalMs must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = DeviceConfig::default();
        assert_eq!(config.device_instance, 389000);
        assert_eq!(config.bacnet_port, 47808);
        assert_eq!(config.trend_log.capacity, 100);
        assert_eq!(config.trend_log_multiple.poll_interval_ms, 3000);
        assert_eq!(config.max_payload_len, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_document() {
        let json = r#"{
            "deviceInstance": 1234,
            "trendLog": {"instance": 11, "name": "TL", "capacity": 5, "pollIntervalMs": 1000}
        }"#;
        let config = DeviceConfig::from_json_str(json).unwrap();

        assert_eq!(config.device_instance, 1234);
        assert_eq!(config.device_name, "Example Trending Device");
        assert_eq!(config.trend_log.capacity, 5);
        assert!(config.trend_log.enabled);
        assert_eq!(config.trend_log_multiple.instance, 20);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let json = r#"{"trendLog": {"instance": 10, "name": "TL", "capacity": 0, "pollIntervalMs": 1000}}"#;
        let err = DeviceConfig::from_json_str(json).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "trendLog",
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_json() {
        let err = DeviceConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidData(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = DeviceConfig::load("/nonexistent/bacnet-trend.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");
        std::fs::write(&path, r#"{"deviceInstance": 12, "bacnetPort": 0}"#).unwrap();

        let config = DeviceConfig::load(&path).unwrap();

        assert_eq!(config.device_instance, 12);
        assert_eq!(config.bacnet_port, 0);
        assert_eq!(config.trend_log, DeviceConfig::default().trend_log);
    }
}
