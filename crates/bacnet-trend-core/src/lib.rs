//! # bacnet-trend-core
//!
//! Core data model for the BACnet trend logging device.
//!
//! This crate provides:
//! - BACnet identifiers (object types, property identifiers, datum tags)
//! - The fixed object registry (device, inputs)
//! - Bounded trend log buffers with ring-buffer eviction
//! - Typed device configuration
//!
//! This crate is intentionally runtime-agnostic and contains no async code
//! and no I/O, so it can be driven by any protocol engine.

pub mod config;
pub mod model;
pub mod registry;
pub mod trend_log;

pub use config::{ConfigError, DeviceConfig};
pub use model::*;
pub use registry::{Device, ObjectDescriptor, ObjectKind, ObjectRegistry, RegistryError};
pub use trend_log::{
    PollingConfig, TrendBuffer, TrendLog, TrendLogAccess, TrendLogError, TrendLogMultiple,
    TrendLogRecord, TrendLogStore,
};
