//! Indexer errors.

use std::path::PathBuf;

use recall_lexical::LexicalError;
use thiserror::Error;

/// Errors that abort a whole reconcile run.
///
/// Problems with a single document never surface here; they are counted
/// in the report instead.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source directory not found: {0}")]
    SourceMissing(PathBuf),

    #[error("Corrupt manifest: {0}")]
    Corrupt(String),

    #[error("Lexical index error: {0}")]
    Lexical(#[from] LexicalError),

    #[error("Directory walk failed: {0}")]
    Walk(String),
}
