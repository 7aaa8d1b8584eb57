//! Trend log polling.
//!
//! Each enabled log captures its monitored properties once per poll
//! interval. The first poll of a log happens on the first step.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bacnet_trend_core::{
    DatumType, ObjectId, ObjectType, PollingConfig, PropertyRef, TrendLogAccess, TrendLogRecord,
};
use tracing::{debug, warn};

use crate::context::DeviceContext;

/// What a single log wants sampled.
struct Due {
    log: ObjectId,
    monitored: Vec<PropertyRef>,
    composite: bool,
}

/// Tracks when each trend log was last polled.
#[derive(Debug, Default)]
pub struct TrendPoller {
    last_poll: HashMap<ObjectId, Instant>,
}

impl TrendPoller {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_due(&self, log: ObjectId, polling: PollingConfig, now: Instant) -> bool {
        if !polling.enabled {
            return false;
        }
        match self.last_poll.get(&log) {
            Some(last) => {
                now.saturating_duration_since(*last) >= Duration::from_millis(polling.interval_ms)
            }
            None => true,
        }
    }

    /// Poll every due log and return how many records were inserted.
    ///
    /// `timestamp` is the Unix time stamped on the new records.
    pub fn poll(&mut self, ctx: &mut DeviceContext, now: Instant, timestamp: u64) -> usize {
        let store = ctx.trend_logs();
        let single = store.logs().map(|l| Due {
            log: ObjectId::new(ObjectType::TrendLog, l.instance),
            monitored: vec![l.monitored],
            composite: false,
        });
        let multiple = store.multiples().map(|l| Due {
            log: ObjectId::new(ObjectType::TrendLogMultiple, l.instance),
            monitored: l.monitored.clone(),
            composite: true,
        });
        let due: Vec<Due> = single
            .chain(multiple)
            .filter(|d| {
                store
                    .polling(d.log)
                    .map(|p| self.is_due(d.log, p, now))
                    .unwrap_or(false)
            })
            .collect();

        let mut inserted = 0;
        for d in due {
            self.last_poll.insert(d.log, now);
            let Some(record) = capture(ctx, &d, timestamp) else {
                warn!(log = %d.log, "Monitored property unavailable, nothing logged");
                continue;
            };
            match ctx.trend_logs_mut().insert(d.log, record) {
                Ok(()) => {
                    debug!(log = %d.log, timestamp, "Trend log polled");
                    inserted += 1;
                }
                Err(e) => warn!(log = %d.log, error = %e, "Failed to record trend sample"),
            }
        }
        inserted
    }
}

fn capture(ctx: &DeviceContext, due: &Due, timestamp: u64) -> Option<TrendLogRecord> {
    if due.composite {
        let payload = due
            .monitored
            .iter()
            .map(|p| match ctx.read_monitored(p) {
                Some(value) => value.to_string(),
                None => "null".to_string(),
            })
            .collect::<Vec<_>>()
            .join(",");
        return Some(TrendLogRecord::new(timestamp, DatumType::LOG_DATA, payload));
    }

    let value = ctx.read_monitored(due.monitored.first()?)?;
    Some(TrendLogRecord::new(
        timestamp,
        value.datum_type().tag(),
        value.to_string(),
    ))
}
