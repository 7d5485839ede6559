//! Persisted record of what the lexical index was last built from.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use recall_lexical::IndexSnapshot;
use recall_protocols::persist::{read_json, write_json};
use recall_protocols::DocumentId;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub content_hash: String,
    pub modified_at: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,
}

/// Content hash per document id, stamped with the generation it matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub generation: u64,
    pub entries: BTreeMap<DocumentId, ManifestEntry>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            generation: 0,
            entries: BTreeMap::new(),
        }
    }
}

impl Manifest {
    /// Rebuild a manifest from the documents held by `snapshot`.
    ///
    /// Used when the saved manifest does not match the loaded index, so
    /// classification is done against what is actually indexed.
    pub fn from_snapshot(snapshot: &IndexSnapshot) -> Self {
        let now = Utc::now();
        let entries = snapshot
            .document_ids()
            .into_iter()
            .filter_map(|id| {
                let entry = snapshot.document(id)?;
                Some((
                    id.clone(),
                    ManifestEntry {
                        content_hash: entry.content_hash.clone(),
                        modified_at: DateTime::<Utc>::UNIX_EPOCH,
                        indexed_at: now,
                    },
                ))
            })
            .collect();
        Self {
            version: FORMAT_VERSION,
            generation: snapshot.generation(),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ManifestEntry> {
        self.entries.get(id)
    }

    /// Load from `path`; a missing file is an empty manifest.
    pub async fn load(path: &Path) -> Result<Self, IndexerError> {
        let manifest: Option<Self> = read_json(path).await.map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                IndexerError::Corrupt(format!("{}: {}", path.display(), e))
            }
            _ => IndexerError::Io(e),
        })?;
        match manifest {
            Some(m) if m.version != FORMAT_VERSION => Err(IndexerError::Corrupt(format!(
                "{}: unsupported manifest version {}",
                path.display(),
                m.version
            ))),
            Some(m) => Ok(m),
            None => Ok(Self::default()),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<(), IndexerError> {
        write_json(path, self).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use recall_lexical::LexicalIndex;
    use recall_protocols::Document;
    use tempfile::TempDir;

    fn entry(hash: &str) -> ManifestEntry {
        ManifestEntry {
            content_hash: hash.to_string(),
            modified_at: Utc::now(),
            indexed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let manifest = Manifest::load(&dir.path().join("manifest.json")).await.unwrap();
        assert!(manifest.is_empty());
        assert_eq!(manifest.generation, 0);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");

        let mut manifest = Manifest::default();
        manifest.generation = 4;
        manifest.entries.insert("a.md".to_string(), entry("h1"));
        manifest.save(&path).await.unwrap();

        let back = Manifest::load(&path).await.unwrap();
        assert_eq!(back, manifest);
    }

    #[tokio::test]
    async fn test_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        tokio::fs::write(&path, b"{\"version\": 1, \"gen").await.unwrap();
        assert!(matches!(
            Manifest::load(&path).await,
            Err(IndexerError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_version_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        tokio::fs::write(&path, br#"{"version": 9, "generation": 1, "entries": {}}"#)
            .await
            .unwrap();
        assert!(matches!(
            Manifest::load(&path).await,
            Err(IndexerError::Corrupt(_))
        ));
    }

    #[test]
    fn test_from_snapshot() {
        let index = LexicalIndex::new();
        let doc = Document::new("notes.md", "some text", Utc::now());
        index.index(&doc);

        let manifest = Manifest::from_snapshot(&index.snapshot());
        assert_eq!(manifest.generation, 1);
        assert_eq!(manifest.get("notes.md").unwrap().content_hash, doc.content_hash);
    }
}
