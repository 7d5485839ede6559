//! Vector backend errors.

use std::time::Duration;

use thiserror::Error;

use super::EmbeddingError;

/// Typed failure surfaced by a vector index adapter.
///
/// Every variant is a degraded-dependency condition: the fusion engine
/// falls back to lexical-only scoring instead of failing the query.
#[derive(Debug, Error)]
pub enum VectorError {
    #[error("Vector query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Vector backend unavailable: {0}")]
    Unavailable(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector query failed: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = VectorError::Timeout(Duration::from_millis(250));
        assert!(err.to_string().contains("timed out"));
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn test_dimension_mismatch_display() {
        let err = VectorError::DimensionMismatch {
            expected: 1024,
            actual: 768,
        };
        let display = err.to_string();
        assert!(display.contains("1024"));
        assert!(display.contains("768"));
    }

    #[test]
    fn test_from_embedding_error() {
        let err: VectorError = EmbeddingError::Failed("model missing".to_string()).into();
        assert!(matches!(err, VectorError::Embedding(_)));
        assert!(err.to_string().contains("model missing"));
    }
}
