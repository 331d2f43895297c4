//! Backup snapshots and their on-disk naming.
//!
//! Snapshot files are named `backup-<ts>.json` with the Unix-millisecond
//! timestamp zero-padded, so lexicographic order equals temporal order.

use ctxrelay_core::context::Context;
use serde::{Deserialize, Serialize};

const PREFIX: &str = "backup-";
const SUFFIX: &str = ".json";

/// A full point-in-time copy of every context held by the vault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    /// Unix milliseconds; also the snapshot's name
    pub timestamp: i64,
    /// Ordered by context id
    pub contexts: Vec<Context>,
}

/// File name for the snapshot taken at `timestamp`.
pub fn file_name(timestamp: i64) -> String {
    format!("{PREFIX}{timestamp:015}{SUFFIX}")
}

/// Timestamp encoded in a snapshot file name, if it is one.
pub fn parse_file_name(name: &str) -> Option<i64> {
    name.strip_prefix(PREFIX)?
        .strip_suffix(SUFFIX)?
        .parse::<i64>()
        .ok()
        .filter(|ts| *ts >= 0)
}

/// Timestamps to delete so that at most `max_backups` remain.
///
/// `timestamps` must be sorted ascending; the oldest are returned.
pub fn rotation_victims(timestamps: &[i64], max_backups: usize) -> &[i64] {
    let excess = timestamps.len().saturating_sub(max_backups);
    &timestamps[..excess]
}
