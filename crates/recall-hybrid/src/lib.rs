//! # Recall Hybrid
//!
//! Hybrid retrieval for recall: a [`FusionEngine`] that blends BM25 and
//! vector similarity, a two-tier [`QueryCache`] invalidated by index
//! generation, the [`Retriever`] that puts the cache in front of the
//! engine, and a [`QueryLog`] of answered queries with user feedback.

mod cache;
mod engine;
mod error;
pub mod fusion;
mod history;
mod retriever;

pub use cache::{
    fingerprint, normalize_query, token_similarity, CacheEntry, CacheLookup, CacheStats,
    QueryCache, QueryCacheConfig, SweepReport,
};
pub use engine::{FusionEngine, SearchOutcome, SemanticLayer, VectorStatus};
pub use error::{CacheError, HistoryError};
pub use history::{
    Feedback, FeedbackSummary, HistoryStats, QueryLog, QueryRecord, Rating, RecordedHit,
    RECORDED_RESULTS,
};
pub use retriever::{QueryOptions, QueryResponse, ResultSource, Retriever, RetrieverStatus};
