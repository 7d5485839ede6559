//! In-memory vector index for similarity search.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use recall_protocols::persist::{read_json, write_json};
use recall_protocols::{
    source_document_id, Embedding, VectorError, VectorHit, VectorIndexAdapter,
};

use crate::error::VectorStoreError;

/// Brute-force cosine index keyed by document or passage id.
pub struct InMemoryVectorIndex {
    dimension: usize,
    vectors: RwLock<HashMap<String, Embedding>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedVectors {
    dimension: usize,
    saved_at: DateTime<Utc>,
    vectors: BTreeMap<String, Vec<f32>>,
}

impl InMemoryVectorIndex {
    /// Create an empty index accepting vectors of `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: RwLock::new(HashMap::new()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Insert or replace a vector.
    pub fn insert(&self, id: impl Into<String>, embedding: Embedding) -> Result<(), VectorError> {
        self.check_dimension(&embedding)?;
        self.vectors.write().insert(id.into(), embedding);
        Ok(())
    }

    /// Remove a vector.
    pub fn remove(&self, id: &str) -> Option<Embedding> {
        self.vectors.write().remove(id)
    }

    /// Remove a document's vector and all of its passages. Returns how many
    /// vectors were dropped.
    pub fn remove_document(&self, document_id: &str) -> usize {
        let mut vectors = self.vectors.write();
        let before = vectors.len();
        vectors.retain(|id, _| source_document_id(id) != document_id);
        before - vectors.len()
    }

    /// Get a vector by id.
    pub fn get(&self, id: &str) -> Option<Embedding> {
        self.vectors.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.vectors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.read().is_empty()
    }

    /// Nearest `limit` vectors, by similarity desc then id asc.
    pub fn search(&self, query: &Embedding, limit: usize) -> Vec<VectorHit> {
        let vectors = self.vectors.read();
        let mut results: Vec<VectorHit> = vectors
            .iter()
            .map(|(id, emb)| VectorHit::new(id.clone(), query.cosine_similarity(emb)))
            .collect();

        results.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(limit);
        results
    }

    /// Write all vectors to `path`.
    pub async fn save(&self, path: &Path) -> Result<(), VectorStoreError> {
        let persisted = PersistedVectors {
            dimension: self.dimension,
            saved_at: Utc::now(),
            vectors: self
                .vectors
                .read()
                .iter()
                .map(|(id, emb)| (id.clone(), emb.vector.clone()))
                .collect(),
        };
        write_json(path, &persisted).await?;
        debug!(path = %path.display(), count = persisted.vectors.len(), "Saved vector index");
        Ok(())
    }

    /// Load vectors from `path`, or an empty index if it does not exist.
    ///
    /// A file written with a different dimension is discarded: its vectors
    /// are not comparable with the current provider's output.
    pub async fn load(path: &Path, dimension: usize) -> Result<Self, VectorStoreError> {
        let persisted: Option<PersistedVectors> =
            read_json(path).await.map_err(|e| match e.kind() {
                io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                    VectorStoreError::Corrupt(format!("{}: {}", path.display(), e))
                }
                _ => VectorStoreError::Io(e),
            })?;

        let index = Self::new(dimension);
        match persisted {
            Some(p) if p.dimension == dimension => {
                let mut vectors = index.vectors.write();
                for (id, vector) in p.vectors {
                    if vector.len() == dimension {
                        vectors.insert(id, Embedding::new(vector));
                    }
                }
                info!(count = vectors.len(), "Loaded vector index");
            }
            Some(p) => {
                info!(
                    stored = p.dimension,
                    expected = dimension,
                    "Discarding vector index with different dimension"
                );
            }
            None => {}
        }
        Ok(index)
    }

    fn check_dimension(&self, embedding: &Embedding) -> Result<(), VectorError> {
        if embedding.dimension != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.dimension,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndexAdapter for InMemoryVectorIndex {
    async fn query(&self, vector: &Embedding, k: usize) -> Result<Vec<VectorHit>, VectorError> {
        self.check_dimension(vector)?;
        Ok(self.search(vector, k))
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
