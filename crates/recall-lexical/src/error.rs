//! Lexical index errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LexicalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt index file: {0}")]
    Corrupt(String),
}
