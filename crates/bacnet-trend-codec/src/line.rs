//! Single backup line parsing and formatting.
//!
//! Data lines have the layout `index,timestamp,datumType,payloadText`. The
//! payload is everything after the third comma, so payload text may itself
//! contain commas (composite trend log multiple records do). The same rule
//! applies to both log kinds.

use bacnet_trend_core::TrendLogRecord;
use thiserror::Error;

/// Why a data line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    /// Nothing but whitespace.
    #[error("empty data line")]
    Blank,

    /// Fewer than four comma separated fields.
    #[error("expected 4 fields, found {0}")]
    FieldCount(usize),

    /// The running index is not a number.
    #[error("invalid index {0:?}")]
    Index(String),

    /// The timestamp is not an unsigned number of seconds.
    #[error("invalid timestamp {0:?}")]
    Timestamp(String),

    /// The datum type is not a byte.
    #[error("invalid datum type {0:?}")]
    DatumType(String),
}

/// A parsed data line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupLine {
    /// Running 1-based index as written on export; informational only.
    pub index: u64,
    pub record: TrendLogRecord,
}

/// Parse one line of a backup file.
///
/// Returns `Ok(None)` for comment lines (leading `#`). A blank line does
/// not split into four fields and is rejected like any other bad line.
pub fn parse_line(line: &str) -> Result<Option<BackupLine>, LineError> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.starts_with('#') {
        return Ok(None);
    }
    if line.trim().is_empty() {
        return Err(LineError::Blank);
    }

    let fields: Vec<&str> = line.splitn(4, ',').collect();
    let &[index, timestamp, datum_type, payload] = fields.as_slice() else {
        return Err(LineError::FieldCount(fields.len()));
    };

    let index = index
        .trim()
        .parse::<u64>()
        .map_err(|_| LineError::Index(index.to_string()))?;
    let timestamp = timestamp
        .trim()
        .parse::<u64>()
        .map_err(|_| LineError::Timestamp(timestamp.to_string()))?;
    let datum_type = datum_type
        .trim()
        .parse::<u8>()
        .map_err(|_| LineError::DatumType(datum_type.to_string()))?;

    Ok(Some(BackupLine {
        index,
        record: TrendLogRecord::new(timestamp, datum_type, payload.as_bytes()),
    }))
}

/// Format a record as a data line (without the line terminator).
///
/// Payload bytes are written as text; bytes that are not valid UTF-8 are
/// replaced rather than escaped.
pub fn format_line(index: u64, record: &TrendLogRecord) -> String {
    format!(
        "{},{},{},{}",
        index,
        record.timestamp,
        record.datum_type,
        String::from_utf8_lossy(&record.payload)
    )
}
