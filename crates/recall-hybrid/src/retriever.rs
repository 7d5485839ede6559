//! Query entry point: cache first, fusion engine on a miss.

use std::sync::Arc;

use recall_protocols::{ScoredResult, SearchError, SearchWeights};
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::cache::{CacheLookup, CacheStats, QueryCache};
use crate::engine::{FusionEngine, VectorStatus};
use crate::history::QueryLog;

/// Per-call query parameters.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub weights: SearchWeights,
    pub top_k: usize,
    /// Read from and write to the cache.
    pub use_cache: bool,
    /// Accept a near-duplicate cache hit instead of recomputing.
    pub accept_approximate: bool,
    /// Deadline for the vector sub-query.
    pub deadline: Option<Instant>,
}

impl QueryOptions {
    pub fn new(weights: SearchWeights, top_k: usize) -> Self {
        Self {
            weights,
            top_k,
            use_cache: true,
            accept_approximate: false,
            deadline: None,
        }
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn accept_approximate(mut self, accept: bool) -> Self {
        self.accept_approximate = accept;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Where a response came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultSource {
    Computed,
    Cached,
    Approximate { similarity: f32, matched_query: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub results: Vec<ScoredResult>,
    pub source: ResultSource,
    pub generation: u64,
    /// Set when a configured vector backend failed for this query.
    pub degraded: Option<String>,
    /// Query log record, when a log is attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
}

/// Snapshot of engine and cache state.
#[derive(Debug, Clone, Serialize)]
pub struct RetrieverStatus {
    pub generation: u64,
    pub documents: usize,
    pub terms: usize,
    pub vector_backend: Option<String>,
    pub cache: Option<CacheStats>,
}

/// Cache-fronted fusion engine.
pub struct Retriever {
    engine: FusionEngine,
    cache: Option<Arc<QueryCache>>,
    history: Option<Arc<QueryLog>>,
}

impl Retriever {
    pub fn new(engine: FusionEngine) -> Self {
        Self {
            engine,
            cache: None,
            history: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<QueryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Record every non-blank query in `history`.
    pub fn with_history(mut self, history: Arc<QueryLog>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn history(&self) -> Option<&Arc<QueryLog>> {
        self.history.as_ref()
    }

    pub fn engine(&self) -> &FusionEngine {
        &self.engine
    }

    pub fn cache(&self) -> Option<&Arc<QueryCache>> {
        self.cache.as_ref()
    }

    pub async fn query(&self, text: &str, options: &QueryOptions) -> Result<QueryResponse, SearchError> {
        let started = Instant::now();
        let mut response = self.answer(text, options).await?;
        if let Some(history) = &self.history {
            if !text.trim().is_empty() {
                response.record_id = Some(history.record(text, &response, started.elapsed()));
            }
        }
        Ok(response)
    }

    async fn answer(&self, text: &str, options: &QueryOptions) -> Result<QueryResponse, SearchError> {
        options.weights.validate()?;
        let generation = self.engine.lexical().generation();
        let cache = self.cache.as_ref().filter(|_| options.use_cache);

        if let Some(cache) = cache {
            let lookup = if options.accept_approximate {
                cache.lookup(text, options.weights, options.top_k, generation)
            } else {
                cache.lookup_exact(text, options.weights, options.top_k, generation)
            };
            match lookup {
                CacheLookup::Exact(results) => {
                    return Ok(QueryResponse {
                        results,
                        source: ResultSource::Cached,
                        generation,
                        degraded: None,
                        record_id: None,
                    });
                }
                CacheLookup::Approximate {
                    results,
                    similarity,
                    matched_query,
                } => {
                    return Ok(QueryResponse {
                        results,
                        source: ResultSource::Approximate {
                            similarity,
                            matched_query,
                        },
                        generation,
                        degraded: None,
                        record_id: None,
                    });
                }
                CacheLookup::Miss => {}
            }
        }

        let outcome = self
            .engine
            .search_with_deadline(text, options.weights, options.top_k, options.deadline)
            .await?;

        let degraded = match &outcome.vector {
            VectorStatus::Failed(reason) => Some(reason.clone()),
            _ => None,
        };

        if let Some(cache) = cache {
            if degraded.is_none() && !text.trim().is_empty() {
                cache.insert(
                    text,
                    options.weights,
                    options.top_k,
                    outcome.generation,
                    outcome.results.clone(),
                );
            } else {
                debug!("Not caching degraded or empty query");
            }
        }

        Ok(QueryResponse {
            results: outcome.results,
            source: ResultSource::Computed,
            generation: outcome.generation,
            degraded,
            record_id: None,
        })
    }

    pub fn status(&self) -> RetrieverStatus {
        let snapshot = self.engine.lexical().snapshot();
        RetrieverStatus {
            generation: snapshot.generation(),
            documents: snapshot.doc_count(),
            terms: snapshot.term_count(),
            vector_backend: self.engine.semantic_name().map(str::to_string),
            cache: self.cache.as_ref().map(|c| c.stats()),
        }
    }
}
