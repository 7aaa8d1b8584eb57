//! Trend log backup import and export.
//!
//! Import tolerates damage: a malformed line, or a record the store rejects,
//! is logged and skipped and loading continues. Only failing to open the
//! backup file is fatal. Export writes a fresh, timestamp-named file each
//! time so earlier backups are never overwritten.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use bacnet_trend_core::{ObjectId, ObjectType, TrendLogAccess, TrendLogError, TrendLogStore};
use chrono::{DateTime, TimeZone};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::line::{format_line, parse_line};

/// `chrono` pattern for backup file name suffixes, e.g. `2020May291530`.
pub const FILE_SUFFIX_FORMAT: &str = "%Y%b%-d%H%M";

const TREND_LOG_LEGEND: &str = "# Number, Timestamp (Epoch), DatumType, DatumAsString";
const TREND_LOG_MULTIPLE_LEGEND: &str = "# Number, Timestamp (Epoch), DataType, DataAsString";

/// How many numbered alternatives are tried before giving up on a file name.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Errors that can occur while importing or exporting a backup.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The backup file could not be opened.
    #[error("Failed to open backup {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading or writing failed part way through.
    #[error("Backup I/O error: {0}")]
    Io(#[from] io::Error),

    /// The target log does not exist.
    #[error(transparent)]
    Store(#[from] TrendLogError),

    /// Every candidate output file name already exists.
    #[error("No free backup file name for {0}")]
    NameExhausted(PathBuf),
}

/// Outcome of an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Records inserted into the log.
    pub loaded: usize,
    /// Data lines that were malformed or rejected by the store.
    pub skipped: usize,
}

/// Outcome of an export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportReport {
    /// Data lines written.
    pub written: usize,
    /// Records that could not be read and were left out.
    pub skipped: usize,
}

/// Load data lines from `reader` into `log`.
///
/// Existing records are kept; new ones are appended (and evict the oldest
/// once the log is full).
pub fn import<R, S>(reader: R, store: &mut S, log: ObjectId) -> Result<ImportReport, CodecError>
where
    R: BufRead,
    S: TrendLogAccess + ?Sized,
{
    // Fail fast on an unknown log instead of reporting every line as skipped.
    store.count(log)?;

    let mut report = ImportReport::default();

    for (n, raw) in reader.split(b'\n').enumerate() {
        let raw = raw?;
        let line_no = n + 1;

        let line = match std::str::from_utf8(&raw) {
            Ok(line) => line,
            Err(e) => {
                warn!(%log, line_no, "Skipping backup line that is not valid UTF-8: {}", e);
                report.skipped += 1;
                continue;
            }
        };

        let parsed = match parse_line(line) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => continue,
            Err(e) => {
                warn!(%log, line_no, "Invalid data line {:?}: {}", line, e);
                report.skipped += 1;
                continue;
            }
        };

        match store.insert(log, parsed.record) {
            Ok(()) => report.loaded += 1,
            Err(e) => {
                warn!(%log, line_no, "Failed to insert record for line {:?}: {}", line, e);
                report.skipped += 1;
            }
        }
    }

    debug!(%log, loaded = report.loaded, skipped = report.skipped, "Backup import finished");
    Ok(report)
}

/// Replace the contents of `log` with the records in the file at `path`.
///
/// Failing to open the file is reported as [`CodecError::Open`]; callers treat
/// it as fatal.
pub fn import_file(
    path: impl AsRef<Path>,
    store: &mut TrendLogStore,
    log: ObjectId,
) -> Result<ImportReport, CodecError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| CodecError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    store.clear(log)?;
    let report = import(BufReader::new(file), store, log)?;
    info!(
        %log,
        path = %path.display(),
        loaded = report.loaded,
        skipped = report.skipped,
        "Loaded trend log backup"
    );
    Ok(report)
}

/// Column legend written in the header for a log kind.
pub fn legend(log: ObjectId) -> &'static str {
    match log.object_type {
        ObjectType::TrendLogMultiple => TREND_LOG_MULTIPLE_LEGEND,
        _ => TREND_LOG_LEGEND,
    }
}

/// Write the header and every retained record of `log` to `writer`.
///
/// A record that cannot be read is logged and skipped; the export always
/// moves on to the next offset.
pub fn export<W, S, Tz>(
    mut writer: W,
    store: &S,
    log: ObjectId,
    generated_at: &DateTime<Tz>,
) -> Result<ExportReport, CodecError>
where
    W: Write,
    S: TrendLogAccess + ?Sized,
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let count = store.count(log)?;

    writeln!(writer, "# Backup generated on {}", generated_at.to_rfc3339())?;
    writeln!(writer, "#")?;
    writeln!(writer, "{}", legend(log))?;

    let mut report = ExportReport::default();
    let mut offset = 0;
    let mut more = count > 0;

    while more {
        match store.read_at(log, offset) {
            Ok((record, next)) => {
                writeln!(writer, "{}", format_line(offset as u64 + 1, &record))?;
                report.written += 1;
                more = next;
            }
            Err(e) => {
                warn!(%log, offset, "Failed to read record, skipping: {}", e);
                report.skipped += 1;
                more = offset + 1 < count;
            }
        }
        offset += 1;
    }

    writer.flush()?;
    Ok(report)
}

/// Backup file name `<base>_<YYYYMMMdHHmm>.txt`.
pub fn backup_file_name<Tz>(base: &str, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    format!("{}_{}.txt", base, now.format(FILE_SUFFIX_FORMAT))
}

/// Create a new file in `dir` without touching existing ones.
///
/// When the timestamped name is already taken (two exports in the same
/// minute) a `-2`, `-3`, ... counter is appended.
fn create_unique(dir: &Path, file_name: &str) -> Result<(PathBuf, File), CodecError> {
    let stem = file_name.strip_suffix(".txt").unwrap_or(file_name);

    for attempt in 1..=MAX_NAME_ATTEMPTS {
        let candidate = if attempt == 1 {
            dir.join(file_name)
        } else {
            dir.join(format!("{}-{}.txt", stem, attempt))
        };

        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(source) => {
                return Err(CodecError::Open {
                    path: candidate,
                    source,
                })
            }
        }
    }

    Err(CodecError::NameExhausted(dir.join(file_name)))
}

/// Export `log` to a freshly named file in `dir` and return its path.
pub fn export_file<S, Tz>(
    dir: impl AsRef<Path>,
    base: &str,
    store: &S,
    log: ObjectId,
    now: &DateTime<Tz>,
) -> Result<PathBuf, CodecError>
where
    S: TrendLogAccess + ?Sized,
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    // Check the log before creating an empty file for it.
    store.count(log)?;

    let (path, file) = create_unique(dir.as_ref(), &backup_file_name(base, now))?;
    let report = export(BufWriter::new(file), store, log, now)?;
    info!(
        %log,
        path = %path.display(),
        written = report.written,
        skipped = report.skipped,
        "Trend log backup written"
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bacnet_trend_core::{DeviceConfig, TrendLogRecord};
    use chrono::{FixedOffset, Utc};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    const TL: ObjectId = ObjectId::new(ObjectType::TrendLog, 10);
    const TLM: ObjectId = ObjectId::new(ObjectType::TrendLogMultiple, 20);

    fn store() -> TrendLogStore {
        TrendLogStore::from_config(&DeviceConfig::default())
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
    }

    fn records(store: &TrendLogStore, log: ObjectId) -> Vec<TrendLogRecord> {
        store.buffer(log).unwrap().iter().cloned().collect()
    }

    #[test]
    fn test_import_scenario() {
        let mut store = store();
        let input = "# comment\n1,1590768000,1,42.0\nbad,data\n";

        let report = import(Cursor::new(input), &mut store, TL).unwrap();

        assert_eq!(report, ImportReport { loaded: 1, skipped: 1 });
        assert_eq!(
            records(&store, TL),
            vec![TrendLogRecord::new(1590768000, 1, "42.0")]
        );
    }

    #[test]
    fn test_import_counts_good_and_bad_lines() {
        let mut store = store();
        let mut input = String::from("# header\n#\n");
        for n in 1..=5 {
            input.push_str(&format!("{},{},2,{}.5\n", n, 1590768000 + n, n));
        }
        input.push_str("only,three,fields\n");
        input.push_str("1,notatime,2,1.0\n");
        input.push_str("1,1590768100,999,1.0\n");

        let report = import(Cursor::new(input), &mut store, TL).unwrap();

        assert_eq!(report.loaded, 5);
        assert_eq!(report.skipped, 3);
        assert_eq!(store.count(TL).unwrap(), 5);
    }

    #[test]
    fn test_import_reports_blank_lines() {
        let mut store = store();
        let input = "# header\n1,1,2,1.0\n\n2,2,2,2.0\n   \n";

        let report = import(Cursor::new(input), &mut store, TL).unwrap();

        assert_eq!(report, ImportReport { loaded: 2, skipped: 2 });
        assert_eq!(store.count(TL).unwrap(), 2);
    }

    #[test]
    fn test_import_skips_oversized_payload() {
        let mut store = store();
        let input = format!("1,1,2,{}\n2,2,2,ok\n", "x".repeat(257));

        let report = import(Cursor::new(input), &mut store, TL).unwrap();

        assert_eq!(report, ImportReport { loaded: 1, skipped: 1 });
    }

    #[test]
    fn test_import_skips_invalid_utf8() {
        let mut store = store();
        let mut input = b"1,1,2,ok\n".to_vec();
        input.extend_from_slice(b"2,2,2,\xff\xfe\n");
        input.extend_from_slice(b"3,3,2,fine\n");

        let report = import(Cursor::new(input), &mut store, TL).unwrap();

        assert_eq!(report, ImportReport { loaded: 2, skipped: 1 });
    }

    #[test]
    fn test_import_unknown_log() {
        let mut store = store();
        let unknown = ObjectId::new(ObjectType::TrendLog, 99);
        let err = import(Cursor::new("1,1,1,1\n"), &mut store, unknown).unwrap_err();
        assert!(matches!(err, CodecError::Store(TrendLogError::UnknownLog(_))));
    }

    #[test]
    fn test_import_file_missing_is_open_error() {
        let mut store = store();
        let err = import_file("/nonexistent/trendLogBackupExample.txt", &mut store, TL).unwrap_err();
        assert!(matches!(err, CodecError::Open { .. }));
    }

    #[test]
    fn test_import_file_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.txt");
        std::fs::write(&path, "1,100,2,1.0\n2,200,2,2.0\n").unwrap();

        let mut store = store();
        store.insert(TL, TrendLogRecord::new(1, 2, "old")).unwrap();

        let report = import_file(&path, &mut store, TL).unwrap();

        assert_eq!(report.loaded, 2);
        assert_eq!(
            records(&store, TL),
            vec![
                TrendLogRecord::new(100, 2, "1.0"),
                TrendLogRecord::new(200, 2, "2.0"),
            ]
        );
    }

    #[test]
    fn test_export_empty_log() {
        let store = store();
        let mut out = Vec::new();

        let report = export(&mut out, &store, TL, &at(2020, 5, 29, 15, 30)).unwrap();

        assert_eq!(report.written, 0);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "# Backup generated on 2020-05-29T15:30:00+00:00\n\
             #\n\
             # Number, Timestamp (Epoch), DatumType, DatumAsString\n"
        );
    }

    #[test]
    fn test_export_lines() {
        let mut store = store();
        store.insert(TLM, TrendLogRecord::new(10, 1, "1.0,0.0,true,2")).unwrap();
        store.insert(TLM, TrendLogRecord::new(13, 1, "4.0,0.0,true,2")).unwrap();
        let mut out = Vec::new();

        export(&mut out, &store, TLM, &Utc::now()).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[2], "# Number, Timestamp (Epoch), DataType, DataAsString");
        assert_eq!(&lines[3..], ["1,10,1,1.0,0.0,true,2", "2,13,1,4.0,0.0,true,2"]);
    }

    #[test]
    fn test_round_trip_after_eviction() {
        let mut config = DeviceConfig::default();
        config.trend_log.capacity = 3;
        let mut source = TrendLogStore::from_config(&config);
        for n in 1..=5u64 {
            source
                .insert(TL, TrendLogRecord::new(1000 + n, 2, format!("{}.25", n)))
                .unwrap();
        }
        let mut out = Vec::new();
        export(&mut out, &source, TL, &Utc::now()).unwrap();

        let mut target = store();
        let report = import(Cursor::new(out), &mut target, TL).unwrap();

        assert_eq!(report, ImportReport { loaded: 3, skipped: 0 });
        assert_eq!(records(&target, TL), records(&source, TL));
        assert_eq!(records(&target, TL)[0].timestamp, 1003);
    }

    #[test]
    fn test_backup_file_name() {
        assert_eq!(
            backup_file_name("trendLogBackupExample", &at(2020, 5, 9, 7, 5)),
            "trendLogBackupExample_2020May90705.txt"
        );
        assert_eq!(
            backup_file_name("trendLogMultipleBackupExample", &at(2020, 12, 29, 15, 30)),
            "trendLogMultipleBackupExample_2020Dec291530.txt"
        );
    }

    #[test]
    fn test_export_file_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store();
        store.insert(TL, TrendLogRecord::new(1, 2, "1.0")).unwrap();
        let now = at(2020, 5, 29, 15, 30);

        let first = export_file(dir.path(), "trendLogBackupExample", &store, TL, &now).unwrap();
        let second = export_file(dir.path(), "trendLogBackupExample", &store, TL, &now).unwrap();

        assert_ne!(first, second);
        assert_eq!(
            first.file_name().unwrap(),
            "trendLogBackupExample_2020May291530.txt"
        );
        assert_eq!(
            second.file_name().unwrap(),
            "trendLogBackupExample_2020May291530-2.txt"
        );

        let text = std::fs::read_to_string(&first).unwrap();
        assert!(text.ends_with("1,1,2,1.0\n"));
    }
}
