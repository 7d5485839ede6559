//! Vector-side protocol definitions.
//!
//! The engine never computes embeddings itself; it talks to an external
//! provider and an externally maintained similarity index through these
//! traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::{EmbeddingError, VectorError};

/// Dense vector representation of a text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    /// Vector representation.
    pub vector: Vec<f32>,
    /// Dimension of the embedding.
    pub dimension: usize,
}

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        let dimension = vector.len();
        Self { vector, dimension }
    }

    /// Compute cosine similarity with another embedding.
    pub fn cosine_similarity(&self, other: &Self) -> f32 {
        if self.dimension != other.dimension {
            return 0.0;
        }

        let dot: f32 = self
            .vector
            .iter()
            .zip(other.vector.iter())
            .map(|(a, b)| a * b)
            .sum();

        let norm_a: f32 = self.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = other.vector.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot / (norm_a * norm_b)
    }
}

/// One neighbour returned by a similarity backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    /// Document id, or passage id of the form `doc#n`.
    pub id: String,
    pub similarity: f32,
}

impl VectorHit {
    pub fn new(id: impl Into<String>, similarity: f32) -> Self {
        Self {
            id: id.into(),
            similarity,
        }
    }
}

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for text.
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;

    /// Generate embeddings for multiple texts.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError>;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;
}

/// Black-box nearest-neighbour backend.
///
/// Called exactly once per fusion engine invocation. Implementations return
/// at most `k` hits ordered by descending similarity.
#[async_trait]
pub trait VectorIndexAdapter: Send + Sync {
    async fn query(&self, vector: &Embedding, k: usize) -> Result<Vec<VectorHit>, VectorError>;

    /// Name for logging.
    fn name(&self) -> &str;
}

/// Receiver for documents whose content changed during reconciliation.
///
/// The indexer calls this after its commit so the semantic layer can
/// re-embed only the changed set.
#[async_trait]
pub trait EmbeddingSink: Send + Sync {
    async fn upsert(&self, document: &Document) -> Result<(), EmbeddingError>;

    async fn remove(&self, document_id: &str) -> Result<(), EmbeddingError>;

    /// Persist any buffered state. Called once per reconcile.
    async fn flush(&self) -> Result<(), EmbeddingError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_creation() {
        let emb = Embedding::new(vec![0.5, 0.5, 0.0, 0.0]);
        assert_eq!(emb.dimension, 4);
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = Embedding::new(vec![1.0, 0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!((a.cosine_similarity(&b) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![-1.0, 0.0]);
        assert!((a.cosine_similarity(&b) + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_different_dimensions() {
        let a = Embedding::new(vec![1.0, 0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(a.cosine_similarity(&b), 0.0);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = Embedding::new(vec![1.0, 0.0, 0.0]);
        let b = Embedding::new(vec![0.0, 0.0, 0.0]);
        assert_eq!(a.cosine_similarity(&b), 0.0);
    }

    #[test]
    fn test_vector_hit_new() {
        let hit = VectorHit::new("doc#1", 0.9);
        assert_eq!(hit.id, "doc#1");
        assert!((hit.similarity - 0.9).abs() < f32::EPSILON);
    }
}
