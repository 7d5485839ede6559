//! On-disk form of the lexical index.
//!
//! Only per-document term frequencies are stored; posting lists and corpus
//! statistics are derived again on load.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use recall_protocols::persist::{read_json, write_json};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::LexicalError;
use crate::index::{DocEntry, IndexSnapshot, LexicalIndex};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedIndex {
    pub version: u32,
    pub generation: u64,
    pub saved_at: DateTime<Utc>,
    pub documents: Vec<PersistedDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedDocument {
    pub id: String,
    pub content_hash: String,
    pub terms: BTreeMap<String, u32>,
}

impl PersistedIndex {
    pub fn from_snapshot(snapshot: &IndexSnapshot) -> Self {
        let mut documents: Vec<_> = snapshot
            .entries()
            .map(|(id, entry)| PersistedDocument {
                id: id.clone(),
                content_hash: entry.content_hash.clone(),
                terms: entry.term_freqs.clone(),
            })
            .collect();
        documents.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            version: FORMAT_VERSION,
            generation: snapshot.generation(),
            saved_at: Utc::now(),
            documents,
        }
    }

    pub fn into_snapshot(self) -> IndexSnapshot {
        let mut snapshot = IndexSnapshot::with_generation(self.generation);
        for doc in self.documents {
            let entry = DocEntry::from_terms(doc.content_hash, doc.terms);
            snapshot.insert_entry(doc.id, Arc::new(entry));
        }
        snapshot
    }
}

/// Write `snapshot` to `path`.
pub async fn save_index(snapshot: &IndexSnapshot, path: &Path) -> Result<(), LexicalError> {
    let persisted = PersistedIndex::from_snapshot(snapshot);
    write_json(path, &persisted).await?;
    debug!(path = %path.display(), generation = persisted.generation, "Saved lexical index");
    Ok(())
}

/// Load the index at `path`, or an empty generation-0 index if absent.
pub async fn load_index(path: &Path) -> Result<LexicalIndex, LexicalError> {
    let persisted: Option<PersistedIndex> = read_json(path).await.map_err(|e| match e.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            LexicalError::Corrupt(format!("{}: {}", path.display(), e))
        }
        _ => LexicalError::Io(e),
    })?;

    match persisted {
        Some(p) if p.version != FORMAT_VERSION => Err(LexicalError::Corrupt(format!(
            "{}: unsupported format version {}",
            path.display(),
            p.version
        ))),
        Some(p) => {
            let snapshot = p.into_snapshot();
            info!(
                generation = snapshot.generation(),
                documents = snapshot.doc_count(),
                "Loaded lexical index"
            );
            Ok(LexicalIndex::from_snapshot(snapshot))
        }
        None => Ok(LexicalIndex::new()),
    }
}
