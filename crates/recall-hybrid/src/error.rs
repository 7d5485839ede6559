//! Query cache and query log persistence errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache file: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt history file: {0}")]
    Corrupt(String),

    #[error("No query record matches '{0}'")]
    UnknownRecord(String),

    #[error("'{0}' matches more than one query record")]
    AmbiguousRecord(String),
}
