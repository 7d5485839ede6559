//! Guard errors.

use thiserror::Error;

/// Guard error types.
#[derive(Debug, Error)]
pub enum GuardError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot store failure.
    #[error("Snapshot store error: {0}")]
    Store(String),

    /// File is not in the protected set.
    #[error("Not a protected file: {0}")]
    NotProtected(String),

    /// Protected path is absolute or escapes the workspace.
    #[error("Invalid protected path: {0}")]
    InvalidPath(String),

    /// No usable snapshot exists for the file.
    #[error("No snapshot available for {0}")]
    NoSnapshot(String),

    /// No snapshot matches the requested timestamp.
    #[error("No snapshot of {file} matches timestamp {timestamp}")]
    SnapshotNotFound { file: String, timestamp: String },

    /// Restored bytes do not hash to the snapshot's hash.
    #[error("Restore of {file} failed verification: expected {expected}, found {actual}")]
    RestoreVerification {
        file: String,
        expected: String,
        actual: String,
    },

    /// Guard state file could not be parsed.
    #[error("Corrupt guard state: {0}")]
    Corrupt(String),
}
