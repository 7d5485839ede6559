//! Fusion engine: one lexical pass and one vector lookup per query.

use std::sync::Arc;
use std::time::Duration;

use recall_lexical::{tokenize_unique, Bm25, LexicalIndex};
use recall_protocols::{
    EmbeddingProvider, ScoredResult, SearchError, SearchWeights, VectorError, VectorHit,
    VectorIndexAdapter,
};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::fusion::fuse;

/// Vector hits requested per result slot. Passages of one document
/// collapse during fusion, so more than `top_k` are fetched.
const VECTOR_CANDIDATES_PER_RESULT: usize = 3;

/// Embedding provider and similarity backend used together.
pub struct SemanticLayer {
    provider: Arc<dyn EmbeddingProvider>,
    adapter: Arc<dyn VectorIndexAdapter>,
}

impl SemanticLayer {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, adapter: Arc<dyn VectorIndexAdapter>) -> Self {
        Self { provider, adapter }
    }

    pub fn name(&self) -> &str {
        self.adapter.name()
    }

    /// Embed `text` and make exactly one call to the backend.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<VectorHit>, VectorError> {
        let embedding = self.provider.embed(text).await?;
        self.adapter.query(&embedding, k).await
    }
}

/// What happened to the vector side of one search.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorStatus {
    /// The backend answered.
    Used { hits: usize },
    /// Vector weight was zero, the backend was not called.
    Skipped,
    /// No semantic layer is configured.
    NotConfigured,
    /// The backend failed or timed out; results are lexical-only.
    Failed(String),
}

impl VectorStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, VectorStatus::Failed(_))
    }
}

/// Ranked results plus how they were produced.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub results: Vec<ScoredResult>,
    /// Generation of the lexical snapshot the results were computed from.
    pub generation: u64,
    pub vector: VectorStatus,
}

/// Blends lexical and vector rankings.
pub struct FusionEngine {
    lexical: Arc<LexicalIndex>,
    semantic: Option<SemanticLayer>,
    vector_timeout: Duration,
    bm25: Bm25,
}

impl FusionEngine {
    pub fn new(lexical: Arc<LexicalIndex>) -> Self {
        Self {
            lexical,
            semantic: None,
            vector_timeout: Duration::from_secs(2),
            bm25: Bm25::default(),
        }
    }

    pub fn with_semantic(mut self, semantic: SemanticLayer) -> Self {
        self.semantic = Some(semantic);
        self
    }

    pub fn with_vector_timeout(mut self, timeout: Duration) -> Self {
        self.vector_timeout = timeout;
        self
    }

    pub fn with_bm25(mut self, bm25: Bm25) -> Self {
        self.bm25 = bm25;
        self
    }

    pub fn lexical(&self) -> &Arc<LexicalIndex> {
        &self.lexical
    }

    pub fn semantic_name(&self) -> Option<&str> {
        self.semantic.as_ref().map(SemanticLayer::name)
    }

    /// Search with no caller deadline.
    pub async fn search(
        &self,
        query: &str,
        weights: SearchWeights,
        top_k: usize,
    ) -> Result<SearchOutcome, SearchError> {
        self.search_with_deadline(query, weights, top_k, None).await
    }

    /// Search, aborting the vector sub-query at `deadline`.
    ///
    /// The deadline never applies to lexical scoring. If the vector side
    /// fails the results are lexical-only; only when the lexical index has
    /// never been committed as well does the search fail.
    pub async fn search_with_deadline(
        &self,
        query: &str,
        weights: SearchWeights,
        top_k: usize,
        deadline: Option<Instant>,
    ) -> Result<SearchOutcome, SearchError> {
        weights.validate()?;
        let snapshot = self.lexical.snapshot();
        let generation = snapshot.generation();
        let terms = tokenize_unique(query);

        if query.trim().is_empty() || top_k == 0 {
            return Ok(SearchOutcome {
                results: Vec::new(),
                generation,
                vector: VectorStatus::Skipped,
            });
        }

        let (_, w_vector) = weights.effective();
        let vector_k = top_k.saturating_mul(VECTOR_CANDIDATES_PER_RESULT);

        // The vector future is polled first so its I/O is in flight while
        // lexical scoring runs.
        let vector_fut = async {
            match &self.semantic {
                None => Err(VectorStatus::NotConfigured),
                Some(_) if w_vector <= 0.0 => Err(VectorStatus::Skipped),
                Some(semantic) => self
                    .query_vector(semantic, query, vector_k, deadline)
                    .await
                    .map_err(|e| VectorStatus::Failed(e.to_string())),
            }
        };
        let lexical_fut = async { snapshot.score_terms(&terms, &self.bm25) };
        let (vector_result, lexical_scores) = tokio::join!(vector_fut, lexical_fut);

        let (hits, status) = match vector_result {
            Ok(hits) => {
                let status = VectorStatus::Used { hits: hits.len() };
                (hits, status)
            }
            Err(status) => (Vec::new(), status),
        };

        if !snapshot.is_available() && !matches!(status, VectorStatus::Used { .. }) {
            let reason = match &status {
                VectorStatus::Failed(e) => format!("lexical index not built, vector search failed: {}", e),
                VectorStatus::NotConfigured => {
                    "lexical index not built and no vector backend configured".to_string()
                }
                VectorStatus::Skipped => {
                    "lexical index not built and vector search skipped (vector weight is 0)".to_string()
                }
                VectorStatus::Used { .. } => "lexical index not built".to_string(),
            };
            return Err(SearchError::NoIndexAvailable { reason });
        }

        if let VectorStatus::Failed(reason) = &status {
            warn!(%reason, "Vector search degraded, using lexical results only");
        }

        let results = fuse(&lexical_scores, &hits, weights, top_k);
        debug!(
            generation,
            lexical = lexical_scores.len(),
            vector = hits.len(),
            results = results.len(),
            "Fused search results"
        );

        Ok(SearchOutcome {
            results,
            generation,
            vector: status,
        })
    }

    async fn query_vector(
        &self,
        semantic: &SemanticLayer,
        query: &str,
        k: usize,
        deadline: Option<Instant>,
    ) -> Result<Vec<VectorHit>, VectorError> {
        let budget = match deadline {
            Some(d) => d
                .saturating_duration_since(Instant::now())
                .min(self.vector_timeout),
            None => self.vector_timeout,
        };
        tokio::time::timeout(budget, semantic.query(query, k))
            .await
            .map_err(|_| VectorError::Timeout(budget))?
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
