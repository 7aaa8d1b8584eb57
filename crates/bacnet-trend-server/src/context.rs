//! Device context.
//!
//! Owns everything the device knows: configuration, the object registry and
//! the trend log store. It is constructed once, passed by reference into the
//! engine and loop, and never reached through globals.

use std::path::{Path, PathBuf};

use bacnet_trend_codec::{self as codec, ImportReport};
use bacnet_trend_core::{
    DeviceConfig, ObjectId, ObjectRegistry, ObjectType, PresentValue, PropertyIdentifier,
    PropertyRef, TrendLogStore,
};
use chrono::{DateTime, TimeZone};
use tracing::info;

use crate::server::ServerError;

/// Import results for both logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupsLoaded {
    pub trend_log: ImportReport,
    pub trend_log_multiple: ImportReport,
}

/// The device state shared by the dispatcher, sampling and polling.
#[derive(Debug, Clone)]
pub struct DeviceContext {
    config: DeviceConfig,
    registry: ObjectRegistry,
    trend_logs: TrendLogStore,
}

impl DeviceContext {
    /// Build the registry and trend logs for `config`.
    pub fn setup(config: DeviceConfig) -> Self {
        let registry = ObjectRegistry::from_config(&config);
        let trend_logs = TrendLogStore::from_config(&config);
        info!(
            device = registry.device().instance,
            objects = registry.objects().len(),
            "Device setup complete"
        );
        Self {
            config,
            registry,
            trend_logs,
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ObjectRegistry {
        &mut self.registry
    }

    pub fn trend_logs(&self) -> &TrendLogStore {
        &self.trend_logs
    }

    pub fn trend_logs_mut(&mut self) -> &mut TrendLogStore {
        &mut self.trend_logs
    }

    pub fn device_instance(&self) -> u32 {
        self.registry.device().instance
    }

    pub fn trend_log_id(&self) -> ObjectId {
        ObjectId::new(ObjectType::TrendLog, self.config.trend_log.instance)
    }

    pub fn trend_log_multiple_id(&self) -> ObjectId {
        ObjectId::new(
            ObjectType::TrendLogMultiple,
            self.config.trend_log_multiple.instance,
        )
    }

    /// Current value of a monitored property, if it names an input's present value.
    pub fn read_monitored(&self, property: &PropertyRef) -> Option<PresentValue> {
        if property.property != PropertyIdentifier::PresentValue {
            return None;
        }
        self.registry
            .get(property.object.object_type, property.object.instance)
            .map(|o| o.present_value())
    }

    /// Preload both trend logs from their configured backup files.
    ///
    /// A backup that cannot be opened aborts with an error; damaged lines
    /// inside a backup are only counted as skipped.
    pub fn load_backups(&mut self) -> Result<BackupsLoaded, ServerError> {
        info!("Loading initial data points into trend logs");
        let trend_log_id = self.trend_log_id();
        let multiple_id = self.trend_log_multiple_id();

        let trend_log = codec::import_file(
            &self.config.trend_log_backup_path,
            &mut self.trend_logs,
            trend_log_id,
        )?;
        let trend_log_multiple = codec::import_file(
            &self.config.trend_log_multiple_backup_path,
            &mut self.trend_logs,
            multiple_id,
        )?;

        info!("Initial data load complete");
        Ok(BackupsLoaded {
            trend_log,
            trend_log_multiple,
        })
    }

    /// Write the trend log to a new timestamped file.
    pub fn backup_trend_log<Tz>(&self, now: &DateTime<Tz>) -> Result<PathBuf, ServerError>
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let base = backup_base(&self.config.trend_log_backup_path, "trendLogBackup");
        Ok(codec::export_file(
            &self.config.backup_directory,
            &base,
            &self.trend_logs,
            self.trend_log_id(),
            now,
        )?)
    }

    /// Write the trend log multiple to a new timestamped file.
    pub fn backup_trend_log_multiple<Tz>(&self, now: &DateTime<Tz>) -> Result<PathBuf, ServerError>
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let base = backup_base(
            &self.config.trend_log_multiple_backup_path,
            "trendLogMultipleBackup",
        );
        Ok(codec::export_file(
            &self.config.backup_directory,
            &base,
            &self.trend_logs,
            self.trend_log_multiple_id(),
            now,
        )?)
    }
}

/// Exported backups are named after the file they are restored from.
fn backup_base(import_path: &Path, fallback: &str) -> String {
    import_path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(fallback)
        .to_string()
}
