//! Re-embedding of changed documents.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use recall_protocols::{
    Document, EmbeddingError, EmbeddingProvider, EmbeddingSink, PASSAGE_SEPARATOR,
};

use crate::index::InMemoryVectorIndex;

/// Split `content` into passages of at most `max_chars` characters.
///
/// Paragraphs (separated by blank lines) are packed greedily; a paragraph
/// longer than the limit is cut at character boundaries. Blank content
/// yields no passages.
pub fn split_passages(content: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut passages = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for paragraph in content.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let chars: Vec<char> = paragraph.chars().collect();
        for piece in chars.chunks(max_chars) {
            let sep = usize::from(current_len > 0) * 2;
            if current_len + sep + piece.len() > max_chars && current_len > 0 {
                passages.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push_str("\n\n");
                current_len += 2;
            }
            current.extend(piece.iter());
            current_len += piece.len();
        }
    }

    if current_len > 0 {
        passages.push(current);
    }
    passages
}

/// [`EmbeddingSink`] that embeds documents into an [`InMemoryVectorIndex`].
///
/// A document that fits in one passage is stored under its own id;
/// longer documents are stored as `id#0`, `id#1`, ...
pub struct IndexingSink {
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<InMemoryVectorIndex>,
    persist_path: Option<PathBuf>,
    max_chars: usize,
}

impl IndexingSink {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<InMemoryVectorIndex>,
        max_chars: usize,
    ) -> Self {
        Self {
            provider,
            index,
            persist_path: None,
            max_chars,
        }
    }

    /// Save the index to `path` on every flush.
    pub fn with_persist_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_path = Some(path.into());
        self
    }
}

#[async_trait]
impl EmbeddingSink for IndexingSink {
    async fn upsert(&self, document: &Document) -> Result<(), EmbeddingError> {
        let passages = split_passages(&document.content, self.max_chars);
        let texts: Vec<&str> = passages.iter().map(String::as_str).collect();
        let embeddings = self.provider.embed_batch(&texts).await?;

        // Old vectors are only replaced once every passage embedded.
        self.index.remove_document(&document.id);
        let single = embeddings.len() == 1;
        for (i, embedding) in embeddings.into_iter().enumerate() {
            let id = if single {
                document.id.clone()
            } else {
                format!("{}{}{}", document.id, PASSAGE_SEPARATOR, i)
            };
            self.index
                .insert(id, embedding)
                .map_err(|e| EmbeddingError::Failed(e.to_string()))?;
        }
        debug!(id = %document.id, passages = texts.len(), "Embedded document");
        Ok(())
    }

    async fn remove(&self, document_id: &str) -> Result<(), EmbeddingError> {
        self.index.remove_document(document_id);
        Ok(())
    }

    async fn flush(&self) -> Result<(), EmbeddingError> {
        if let Some(path) = &self.persist_path {
            self.index
                .save(path)
                .await
                .map_err(|e| EmbeddingError::Failed(e.to_string()))?;
        }
        Ok(())
    }
}
