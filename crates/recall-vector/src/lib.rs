//! # Recall Vector
//!
//! Semantic side of the recall retrieval engine.
//!
//! ## Features
//!
//! - [`InMemoryVectorIndex`]: brute-force cosine index implementing
//!   [`VectorIndexAdapter`](recall_protocols::VectorIndexAdapter), persisted as JSON
//! - [`OllamaEmbedding`]: HTTP client for an Ollama `/api/embeddings` endpoint
//! - [`HashEmbedding`]: deterministic offline embedding for tests and
//!   setups without a model server
//! - [`IndexingSink`]: re-embeds changed documents into the index after
//!   each reconcile

mod error;
mod hash;
mod index;
mod ollama;
mod sink;

pub use error::VectorStoreError;
pub use hash::HashEmbedding;
pub use index::InMemoryVectorIndex;
pub use ollama::{OllamaEmbedding, OllamaEmbeddingConfig};
pub use sink::{split_passages, IndexingSink};
