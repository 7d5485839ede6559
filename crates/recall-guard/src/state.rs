//! Per-file guard state machine and its persisted form.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use recall_protocols::persist::{read_json, write_json};
use serde::{Deserialize, Serialize};

use crate::error::GuardError;

const FORMAT_VERSION: u32 = 1;

/// Where a protected file is in its lifecycle.
///
/// ```text
/// Clean -> Due -> BackingUp -> Clean
/// Clean -> CorruptDetected -> Restoring -> Clean
///                                      \-> Unrecoverable
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    #[default]
    Clean,
    Due,
    BackingUp,
    CorruptDetected,
    Restoring,
    /// A restore failed verification. Left only by an explicit restore.
    Unrecoverable,
}

impl FileState {
    /// States in which the live file must not be snapshotted.
    pub fn blocks_backup(self) -> bool {
        matches!(self, FileState::CorruptDetected | FileState::Unrecoverable)
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileState::Clean => "clean",
            FileState::Due => "due",
            FileState::BackingUp => "backing_up",
            FileState::CorruptDetected => "corrupt_detected",
            FileState::Restoring => "restoring",
            FileState::Unrecoverable => "unrecoverable",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub state: FileState,
    pub last_backup_at: Option<DateTime<Utc>>,
    /// Hash of the most recent snapshot.
    pub last_hash: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardState {
    pub version: u32,
    pub files: BTreeMap<String, FileRecord>,
}

impl Default for GuardState {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            files: BTreeMap::new(),
        }
    }
}

impl GuardState {
    pub fn record(&self, file: &str) -> FileRecord {
        self.files.get(file).cloned().unwrap_or_default()
    }

    pub fn record_mut(&mut self, file: &str) -> &mut FileRecord {
        self.files.entry(file.to_string()).or_default()
    }

    /// Load from `path`; a missing file is an empty state.
    ///
    /// Transient states left by an interrupted run are rolled back:
    /// `BackingUp` to `Due` and `Restoring` to `CorruptDetected`.
    pub async fn load(path: &Path) -> Result<Self, GuardError> {
        let state: Option<Self> = read_json(path).await.map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                GuardError::Corrupt(format!("{}: {}", path.display(), e))
            }
            _ => GuardError::Io(e),
        })?;
        let mut state = match state {
            Some(s) if s.version != FORMAT_VERSION => {
                return Err(GuardError::Corrupt(format!(
                    "{}: unsupported state version {}",
                    path.display(),
                    s.version
                )));
            }
            Some(s) => s,
            None => Self::default(),
        };
        for record in state.files.values_mut() {
            record.state = match record.state {
                FileState::BackingUp => FileState::Due,
                FileState::Restoring => FileState::CorruptDetected,
                other => other,
            };
        }
        Ok(state)
    }

    pub async fn save(&self, path: &Path) -> Result<(), GuardError> {
        write_json(path, self).await?;
        Ok(())
    }
}
