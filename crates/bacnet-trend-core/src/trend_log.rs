//! Trend log storage.
//!
//! Each trend log owns a bounded ring buffer of records. Once the buffer is
//! full, every insert evicts the oldest record first, so memory use is fixed
//! at configuration time. Records are opaque to the store: a timestamp, the
//! datum tag the protocol engine will reinterpret later, and the payload bytes.

use std::collections::{BTreeMap, VecDeque};

use thiserror::Error;
use tracing::{debug, trace};

use crate::config::{DeviceConfig, TrendLogSettings};
use crate::model::{ObjectId, ObjectType, PropertyRef};
use crate::registry::instances;

/// Errors returned by trend log operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrendLogError {
    /// No trend log with this object id exists.
    #[error("Unknown trend log: {0}")]
    UnknownLog(ObjectId),

    /// Payload exceeds the configured maximum.
    #[error("Payload of {len} bytes exceeds maximum of {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// Read past the last retained record.
    #[error("Offset {offset} out of range (count {count})")]
    OffsetOutOfRange { offset: usize, count: usize },
}

/// A single historized sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrendLogRecord {
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    /// Log datum tag.
    pub datum_type: u8,
    /// Encoded value at capture time.
    pub payload: Vec<u8>,
}

impl TrendLogRecord {
    pub fn new(timestamp: u64, datum_type: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            timestamp,
            datum_type,
            payload: payload.into(),
        }
    }
}

/// Polling configuration of a trend log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    pub enabled: bool,
    pub interval_ms: u64,
}

/// Fixed-capacity FIFO of records.
#[derive(Debug, Clone)]
pub struct TrendBuffer {
    records: VecDeque<TrendLogRecord>,
    capacity: usize,
    max_payload_len: usize,
    /// Records ever accepted, including evicted ones.
    total_record_count: u64,
}

impl TrendBuffer {
    pub fn new(capacity: usize, max_payload_len: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            max_payload_len,
            total_record_count: 0,
        }
    }

    /// Append a record, evicting the oldest one when full.
    ///
    /// Oversized payloads are rejected before anything is evicted.
    pub fn insert(&mut self, record: TrendLogRecord) -> Result<(), TrendLogError> {
        if record.payload.len() > self.max_payload_len {
            debug!(
                len = record.payload.len(),
                max = self.max_payload_len,
                "Rejected oversized trend record"
            );
            return Err(TrendLogError::PayloadTooLarge {
                len: record.payload.len(),
                max: self.max_payload_len,
            });
        }
        if self.capacity == 0 {
            return Ok(());
        }
        if self.records.len() == self.capacity {
            if let Some(evicted) = self.records.pop_front() {
                trace!(timestamp = evicted.timestamp, "Trend buffer full, evicted oldest record");
            }
        }
        self.records.push_back(record);
        self.total_record_count += 1;
        Ok(())
    }

    /// Record at `offset` counted from the oldest retained record, plus
    /// whether more records follow it.
    pub fn read_at(&self, offset: usize) -> Result<(&TrendLogRecord, bool), TrendLogError> {
        let count = self.records.len();
        let record = self
            .records
            .get(offset)
            .ok_or(TrendLogError::OffsetOutOfRange { offset, count })?;
        Ok((record, offset + 1 < count))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_payload_len(&self) -> usize {
        self.max_payload_len
    }

    pub fn total_record_count(&self) -> u64 {
        self.total_record_count
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrendLogRecord> {
        self.records.iter()
    }
}

/// Trend log over a single monitored property.
#[derive(Debug, Clone)]
pub struct TrendLog {
    pub name: String,
    pub instance: u32,
    pub monitored: PropertyRef,
    pub polling: PollingConfig,
    pub buffer: TrendBuffer,
}

/// Trend log storing one composite record per poll over several properties.
#[derive(Debug, Clone)]
pub struct TrendLogMultiple {
    pub name: String,
    pub instance: u32,
    pub monitored: Vec<PropertyRef>,
    pub polling: PollingConfig,
    pub buffer: TrendBuffer,
}

/// Primitives a protocol engine uses to fill and serve trend logs.
pub trait TrendLogAccess {
    /// Append a record to a log.
    fn insert(&mut self, log: ObjectId, record: TrendLogRecord) -> Result<(), TrendLogError>;

    /// Random access from the oldest retained record.
    fn read_at(&self, log: ObjectId, offset: usize) -> Result<(TrendLogRecord, bool), TrendLogError>;

    /// Number of retained records.
    fn count(&self, log: ObjectId) -> Result<usize, TrendLogError>;
}

/// All trend logs of the device.
#[derive(Debug, Clone, Default)]
pub struct TrendLogStore {
    logs: BTreeMap<u32, TrendLog>,
    multiples: BTreeMap<u32, TrendLogMultiple>,
}

impl TrendLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the configured trend log and trend log multiple.
    ///
    /// The trend log follows the auto-incrementing analog input; the trend
    /// log multiple follows all four inputs.
    pub fn from_config(config: &DeviceConfig) -> Self {
        let mut store = Self::new();
        let polling = |s: &TrendLogSettings| PollingConfig {
            enabled: s.enabled,
            interval_ms: s.poll_interval_ms,
        };

        store.add_log(TrendLog {
            name: config.trend_log.name.clone(),
            instance: config.trend_log.instance,
            monitored: PropertyRef::present_value(
                ObjectType::AnalogInput,
                instances::AI_AUTO_INCREMENT,
            ),
            polling: polling(&config.trend_log),
            buffer: TrendBuffer::new(config.trend_log.capacity, config.max_payload_len),
        });

        store.add_multiple(TrendLogMultiple {
            name: config.trend_log_multiple.name.clone(),
            instance: config.trend_log_multiple.instance,
            monitored: vec![
                PropertyRef::present_value(ObjectType::AnalogInput, instances::AI_AUTO_INCREMENT),
                PropertyRef::present_value(ObjectType::AnalogInput, instances::AI_MANUAL_INCREMENT),
                PropertyRef::present_value(ObjectType::BinaryInput, instances::BINARY_INPUT),
                PropertyRef::present_value(
                    ObjectType::MultiStateInput,
                    instances::MULTI_STATE_INPUT,
                ),
            ],
            polling: polling(&config.trend_log_multiple),
            buffer: TrendBuffer::new(config.trend_log_multiple.capacity, config.max_payload_len),
        });

        store
    }

    pub fn add_log(&mut self, log: TrendLog) {
        self.logs.insert(log.instance, log);
    }

    pub fn add_multiple(&mut self, log: TrendLogMultiple) {
        self.multiples.insert(log.instance, log);
    }

    pub fn log(&self, instance: u32) -> Option<&TrendLog> {
        self.logs.get(&instance)
    }

    pub fn multiple(&self, instance: u32) -> Option<&TrendLogMultiple> {
        self.multiples.get(&instance)
    }

    pub fn logs(&self) -> impl Iterator<Item = &TrendLog> {
        self.logs.values()
    }

    pub fn multiples(&self) -> impl Iterator<Item = &TrendLogMultiple> {
        self.multiples.values()
    }

    /// Buffer behind a trend log or trend log multiple object.
    pub fn buffer(&self, log: ObjectId) -> Result<&TrendBuffer, TrendLogError> {
        match log.object_type {
            ObjectType::TrendLog => self.logs.get(&log.instance).map(|l| &l.buffer),
            ObjectType::TrendLogMultiple => self.multiples.get(&log.instance).map(|l| &l.buffer),
            _ => None,
        }
        .ok_or(TrendLogError::UnknownLog(log))
    }

    fn buffer_mut(&mut self, log: ObjectId) -> Result<&mut TrendBuffer, TrendLogError> {
        match log.object_type {
            ObjectType::TrendLog => self.logs.get_mut(&log.instance).map(|l| &mut l.buffer),
            ObjectType::TrendLogMultiple => {
                self.multiples.get_mut(&log.instance).map(|l| &mut l.buffer)
            }
            _ => None,
        }
        .ok_or(TrendLogError::UnknownLog(log))
    }

    /// Polling configuration of either log kind.
    pub fn polling(&self, log: ObjectId) -> Result<PollingConfig, TrendLogError> {
        match log.object_type {
            ObjectType::TrendLog => self.logs.get(&log.instance).map(|l| l.polling),
            ObjectType::TrendLogMultiple => self.multiples.get(&log.instance).map(|l| l.polling),
            _ => None,
        }
        .ok_or(TrendLogError::UnknownLog(log))
    }

    /// Drop every record of a log.
    pub fn clear(&mut self, log: ObjectId) -> Result<(), TrendLogError> {
        self.buffer_mut(log)?.clear();
        Ok(())
    }
}

impl TrendLogAccess for TrendLogStore {
    fn insert(&mut self, log: ObjectId, record: TrendLogRecord) -> Result<(), TrendLogError> {
        self.buffer_mut(log)?.insert(record)
    }

    fn read_at(&self, log: ObjectId, offset: usize) -> Result<(TrendLogRecord, bool), TrendLogError> {
        let (record, more) = self.buffer(log)?.read_at(offset)?;
        Ok((record.clone(), more))
    }

    fn count(&self, log: ObjectId) -> Result<usize, TrendLogError> {
        Ok(self.buffer(log)?.len())
    }
}
