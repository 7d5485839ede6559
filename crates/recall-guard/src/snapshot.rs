//! Snapshot records.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp layout used in snapshot names and restore requests.
pub const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

/// Length of a formatted [`STAMP_FORMAT`] timestamp.
const STAMP_LEN: usize = 22;

/// A point-in-time copy of one protected file. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Protected file, relative to the workspace root.
    pub file: String,
    pub taken_at: DateTime<Utc>,
    /// Hex SHA-256 of the copied bytes.
    pub content_hash: String,
    pub size: u64,
}

impl Snapshot {
    pub fn stamp(&self) -> String {
        self.taken_at.format(STAMP_FORMAT).to_string()
    }

    /// Storage name: `{stamp}_{hash}.bak`.
    pub fn file_name(&self) -> String {
        format!("{}_{}.bak", self.stamp(), self.content_hash)
    }

    /// Whether this snapshot's stamp starts with `prefix`
    /// (e.g. `20260301_1200` or a full stamp).
    pub fn matches_stamp(&self, prefix: &str) -> bool {
        !prefix.is_empty() && self.stamp().starts_with(prefix)
    }

    /// Inverse of [`file_name`](Self::file_name).
    pub fn parse_file_name(file: &str, name: &str, size: u64) -> Option<Self> {
        let stem = name.strip_suffix(".bak")?;
        if stem.len() <= STAMP_LEN + 1 || !stem.is_char_boundary(STAMP_LEN) {
            return None;
        }
        let (stamp, rest) = stem.split_at(STAMP_LEN);
        let hash = rest.strip_prefix('_')?;
        if hash.is_empty() || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let taken_at = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()?.and_utc();
        Some(Self {
            file: file.to_string(),
            taken_at,
            content_hash: hash.to_string(),
            size,
        })
    }
}
