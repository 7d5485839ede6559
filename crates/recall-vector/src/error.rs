//! Vector store errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt vector file: {0}")]
    Corrupt(String),
}
