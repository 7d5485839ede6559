//! # Recall Protocols
//!
//! Shared data model and seam traits for the recall retrieval engine.
//! Contains no retrieval logic of its own.
//!
//! ## Core Types
//!
//! - [`Document`] - an immutable, hashed unit of indexed text
//! - [`ScoredResult`] - one ranked row produced by the fusion engine
//! - [`SearchWeights`] - per-call modality weights
//!
//! ## Core Traits
//!
//! - [`VectorIndexAdapter`] - black-box similarity backend
//! - [`EmbeddingProvider`] - external text-to-vector service
//! - [`EmbeddingSink`] - re-embedding hook driven by the indexer

pub mod document;
pub mod error;
pub mod persist;
pub mod search;
pub mod vector;

pub use document::{content_hash, source_document_id, Document, DocumentId, PASSAGE_SEPARATOR};
pub use error::{EmbeddingError, SearchError, VectorError};
pub use search::{ScoredResult, SearchWeights};
pub use vector::{Embedding, EmbeddingProvider, EmbeddingSink, VectorHit, VectorIndexAdapter};
