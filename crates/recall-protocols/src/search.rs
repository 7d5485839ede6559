//! Search request weights and ranked results.

use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Relative weight of each modality for one search call.
///
/// Both values must lie in `[0, 1]`; they need not sum to 1. The fusion
/// engine blends with [`SearchWeights::effective`], so only the ratio matters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchWeights {
    pub lexical: f32,
    pub vector: f32,
}

impl Default for SearchWeights {
    fn default() -> Self {
        Self {
            lexical: 0.3,
            vector: 0.7,
        }
    }
}

impl SearchWeights {
    pub fn new(lexical: f32, vector: f32) -> Self {
        Self { lexical, vector }
    }

    /// Keyword scoring only.
    pub fn lexical_only() -> Self {
        Self::new(1.0, 0.0)
    }

    /// Check both weights are finite and within `[0, 1]`.
    pub fn validate(&self) -> Result<(), SearchError> {
        let in_range = |w: f32| w.is_finite() && (0.0..=1.0).contains(&w);
        if in_range(self.lexical) && in_range(self.vector) {
            Ok(())
        } else {
            Err(SearchError::InvalidWeights {
                lexical: self.lexical,
                vector: self.vector,
            })
        }
    }

    /// Weights rescaled to sum to 1, as `(lexical, vector)`.
    ///
    /// Two zero weights blend both modalities equally.
    pub fn effective(&self) -> (f32, f32) {
        let total = self.lexical + self.vector;
        if total <= 0.0 {
            (0.5, 0.5)
        } else {
            (self.lexical / total, self.vector / total)
        }
    }
}

/// One row of a fused ranking. Produced per query, never persisted by the
/// engine itself (the query cache stores copies).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    /// Source document id.
    pub document_id: String,
    /// Passage that won deduplication; equals `document_id` for whole documents.
    pub passage_id: String,
    /// Raw BM25 score (>= 0, unbounded; 0 when the document had no lexical match).
    pub lexical_score: f32,
    /// Raw similarity from the vector backend, if it returned this passage.
    pub vector_score: Option<f32>,
    /// Lexical score after per-query min-max normalization.
    pub lexical_norm: f32,
    /// Vector score after per-query min-max normalization.
    pub vector_norm: f32,
    /// Weighted blend of the normalized scores.
    pub fused_score: f32,
    /// 1-based position in the final list.
    pub rank: usize,
}
