//! Query-path errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Invalid weights (lexical={lexical}, vector={vector}): each must be within [0, 1]")]
    InvalidWeights { lexical: f32, vector: f32 },

    /// Neither the lexical index nor the semantic layer could serve the query.
    #[error("No index available: {reason}")]
    NoIndexAvailable { reason: String },

    #[error("Internal search error: {0}")]
    Internal(String),
}
