//! Documents and passage identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable identifier of a source document.
pub type DocumentId = String;

/// Separator between a document id and a passage ordinal (`notes.md#3`).
pub const PASSAGE_SEPARATOR: char = '#';

/// An indexed unit of text.
///
/// Documents are immutable once built. A changed file produces a new
/// `Document` under the same id, which replaces the old one when the
/// indexer commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier, stable across re-indexing.
    pub id: DocumentId,
    /// Full text content.
    pub content: String,
    /// Last modification time of the source.
    pub modified_at: DateTime<Utc>,
    /// Hex SHA-256 of the source bytes.
    pub content_hash: String,
}

impl Document {
    /// Build a document, hashing `content` as its source bytes.
    pub fn new(
        id: impl Into<DocumentId>,
        content: impl Into<String>,
        modified_at: DateTime<Utc>,
    ) -> Self {
        let content = content.into();
        let content_hash = content_hash(content.as_bytes());
        Self {
            id: id.into(),
            content,
            modified_at,
            content_hash,
        }
    }

    /// Build a document whose hash was computed over the raw source bytes.
    ///
    /// Used when the text differs from the bytes on disk (e.g. a file that
    /// is not valid UTF-8 is indexed with empty text).
    pub fn with_hash(
        id: impl Into<DocumentId>,
        content: impl Into<String>,
        modified_at: DateTime<Utc>,
        content_hash: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            modified_at,
            content_hash: content_hash.into(),
        }
    }
}

/// Hex-encoded SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Resolve a passage id (`doc#n`) to its source document id.
///
/// Ids without a numeric passage suffix are returned unchanged.
pub fn source_document_id(passage_id: &str) -> &str {
    match passage_id.rsplit_once(PASSAGE_SEPARATOR) {
        Some((doc, ordinal))
            if !doc.is_empty()
                && !ordinal.is_empty()
                && ordinal.bytes().all(|b| b.is_ascii_digit()) =>
        {
            doc
        }
        _ => passage_id,
    }
}

#[cfg(test)]
#[path = "document_tests.rs"]
mod tests;
