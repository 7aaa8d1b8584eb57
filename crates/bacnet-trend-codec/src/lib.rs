//! # bacnet-trend-codec
//!
//! Backup format for trend logs.
//!
//! Backups are plain text, one record per line, so they can be inspected and
//! edited by hand. This crate parses and formats those lines and moves whole
//! logs between files and a [`TrendLogStore`](bacnet_trend_core::TrendLogStore).

pub mod backup;
pub mod line;

pub use backup::*;
pub use line::{format_line, parse_line, BackupLine, LineError};
