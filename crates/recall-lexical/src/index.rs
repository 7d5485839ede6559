//! Copy-on-commit inverted index.
//!
//! The live index is an immutable [`IndexSnapshot`] behind a single
//! swappable handle. Readers clone the handle and keep a consistent view
//! for as long as they hold it. One [`IndexWriter`] at a time builds the
//! next snapshot off to the side and publishes it with [`IndexWriter::commit`],
//! which also bumps the generation. Posting lists and document entries are
//! `Arc`-shared between snapshots, so a commit only copies what it touches.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use recall_protocols::{Document, DocumentId};
use tracing::{debug, info, warn};

use crate::scorer::Bm25;
use crate::tokenizer::{tokenize, tokenize_unique};

/// Documents containing one term, with the term's frequency in each.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostingList {
    entries: BTreeMap<DocumentId, u32>,
}

impl PostingList {
    /// Term frequency for a document, if it contains the term.
    pub fn tf(&self, id: &str) -> Option<u32> {
        self.entries.get(id).copied()
    }

    /// Iterate `(document id, tf)` in document id order.
    pub fn iter(&self) -> impl Iterator<Item = (&DocumentId, u32)> {
        self.entries.iter().map(|(id, tf)| (id, *tf))
    }

    /// Document frequency of the term.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-document statistics recorded at index time.
#[derive(Debug, Clone, PartialEq)]
pub struct DocEntry {
    /// Hash of the content these postings were built from.
    pub content_hash: String,
    /// Number of term occurrences.
    pub length: u32,
    /// Term -> frequency. Sums to `length`.
    pub term_freqs: BTreeMap<String, u32>,
}

impl DocEntry {
    /// Tokenize `content` and count terms.
    pub fn build(content: &str, content_hash: impl Into<String>) -> Self {
        let mut term_freqs = BTreeMap::new();
        let mut length = 0u32;
        for token in tokenize(content) {
            *term_freqs.entry(token).or_insert(0u32) += 1;
            length += 1;
        }
        Self {
            content_hash: content_hash.into(),
            length,
            term_freqs,
        }
    }

    pub(crate) fn from_terms(content_hash: String, term_freqs: BTreeMap<String, u32>) -> Self {
        let length = term_freqs.values().sum();
        Self {
            content_hash,
            length,
            term_freqs,
        }
    }
}

/// A complete, internally consistent version of the index.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    generation: u64,
    committed: bool,
    postings: HashMap<String, Arc<PostingList>>,
    documents: HashMap<DocumentId, Arc<DocEntry>>,
    total_len: u64,
}

impl IndexSnapshot {
    /// Number of commits that produced this snapshot.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True once the index has been committed at least once.
    ///
    /// An index whose generation was only advanced past older state
    /// (see [`LexicalIndex::advance_past`]) stays unavailable.
    pub fn is_available(&self) -> bool {
        self.committed
    }

    pub fn doc_count(&self) -> usize {
        self.documents.len()
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    pub fn avg_doc_len(&self) -> f32 {
        if self.documents.is_empty() {
            0.0
        } else {
            self.total_len as f32 / self.documents.len() as f32
        }
    }

    pub fn doc_freq(&self, term: &str) -> usize {
        self.postings.get(term).map_or(0, |p| p.len())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.documents.contains_key(id)
    }

    pub fn document(&self, id: &str) -> Option<&Arc<DocEntry>> {
        self.documents.get(id)
    }

    pub fn postings(&self, term: &str) -> Option<&Arc<PostingList>> {
        self.postings.get(term)
    }

    /// All document ids, sorted.
    pub fn document_ids(&self) -> Vec<&DocumentId> {
        let mut ids: Vec<_> = self.documents.keys().collect();
        ids.sort();
        ids
    }

    /// Score every document that shares at least one term with `terms`.
    ///
    /// Duplicate query terms count once.
    pub fn score_terms(&self, terms: &[String], bm25: &Bm25) -> HashMap<DocumentId, f32> {
        let mut scores: HashMap<DocumentId, f32> = HashMap::new();
        let n = self.documents.len();
        let avg = self.avg_doc_len();
        let mut seen = std::collections::HashSet::new();

        for term in terms {
            if !seen.insert(term.as_str()) {
                continue;
            }
            let Some(list) = self.postings.get(term) else {
                continue;
            };
            let idf = bm25.idf(n, list.len());
            for (id, tf) in list.iter() {
                let doc_len = self.documents.get(id).map_or(0, |d| d.length);
                *scores.entry(id.clone()).or_insert(0.0) += bm25.term_score(idf, tf, doc_len, avg);
            }
        }

        scores
    }

    /// Tokenize `query` and score with default BM25 parameters.
    pub fn score(&self, query: &str) -> HashMap<DocumentId, f32> {
        self.score_terms(&tokenize_unique(query), &Bm25::default())
    }

    /// Top `limit` documents for `query`, by score desc then id asc.
    pub fn search(&self, query: &str, limit: usize) -> Vec<(DocumentId, f32)> {
        let mut hits: Vec<_> = self.score(query).into_iter().collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        hits.truncate(limit);
        hits
    }

    pub(crate) fn with_generation(generation: u64) -> Self {
        Self {
            generation,
            committed: generation >= 1,
            ..Self::default()
        }
    }

    pub(crate) fn insert_entry(&mut self, id: DocumentId, entry: Arc<DocEntry>) {
        self.remove_entry(&id);
        for (term, tf) in &entry.term_freqs {
            let list = self.postings.entry(term.clone()).or_default();
            Arc::make_mut(list).entries.insert(id.clone(), *tf);
        }
        self.total_len += u64::from(entry.length);
        self.documents.insert(id, entry);
    }

    pub(crate) fn remove_entry(&mut self, id: &str) -> Option<Arc<DocEntry>> {
        let entry = self.documents.remove(id)?;
        for term in entry.term_freqs.keys() {
            if let Some(list) = self.postings.get_mut(term) {
                let list = Arc::make_mut(list);
                list.entries.remove(id);
                if list.entries.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
        self.total_len -= u64::from(entry.length);
        Some(entry)
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&DocumentId, &Arc<DocEntry>)> {
        self.documents.iter()
    }
}

/// Shared handle to the live lexical index.
#[derive(Debug, Default)]
pub struct LexicalIndex {
    current: RwLock<Arc<IndexSnapshot>>,
    writer: Mutex<()>,
}

impl LexicalIndex {
    /// Create an empty, never-committed index (generation 0).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: IndexSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
        }
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }

    /// Begin a write batch. Blocks while another writer is open.
    pub fn writer(&self) -> IndexWriter<'_> {
        let guard = self.writer.lock();
        let working = IndexSnapshot::clone(&self.snapshot());
        IndexWriter {
            index: self,
            _guard: guard,
            working,
            changes: 0,
        }
    }

    /// Insert or replace one document and commit. Returns the new generation.
    pub fn index(&self, document: &Document) -> u64 {
        let mut writer = self.writer();
        writer.index(document);
        writer.commit()
    }

    /// Remove one document and commit. Returns the new generation.
    pub fn remove(&self, id: &str) -> u64 {
        let mut writer = self.writer();
        writer.remove(id);
        writer.commit()
    }

    /// Move the generation above `seen` without committing content.
    ///
    /// Used when this index was rebuilt from less state than some other
    /// artefact (manifest, cache) that recorded generation `seen`. Afterwards
    /// no stamp issued by the lost state can match the live generation.
    /// Returns the resulting generation, unchanged if already above `seen`.
    pub fn advance_past(&self, seen: u64) -> u64 {
        let _guard = self.writer.lock();
        let current = self.snapshot();
        if current.generation > seen {
            return current.generation;
        }
        let mut next = IndexSnapshot::clone(&current);
        next.generation = seen + 1;
        warn!(
            from = current.generation,
            to = next.generation,
            "Advancing lexical generation past previously issued state"
        );
        let generation = next.generation;
        self.publish(next);
        generation
    }

    /// Score `query` against the current snapshot.
    pub fn score(&self, query: &str) -> HashMap<DocumentId, f32> {
        self.snapshot().score(query)
    }

    fn publish(&self, snapshot: IndexSnapshot) {
        *self.current.write() = Arc::new(snapshot);
    }
}

/// Exclusive builder for the next snapshot.
///
/// Changes stay private until [`commit`](Self::commit). Dropping a writer
/// without committing discards them.
pub struct IndexWriter<'a> {
    index: &'a LexicalIndex,
    _guard: MutexGuard<'a, ()>,
    working: IndexSnapshot,
    changes: usize,
}

impl IndexWriter<'_> {
    /// Insert or replace the postings for `document`.
    ///
    /// Returns `false` when the document is already indexed with the same
    /// content hash; its entry is then left untouched. Empty or
    /// non-textual content yields an empty posting set.
    pub fn index(&mut self, document: &Document) -> bool {
        if let Some(existing) = self.working.documents.get(&document.id) {
            if existing.content_hash == document.content_hash {
                return false;
            }
        }
        let entry = DocEntry::build(&document.content, document.content_hash.clone());
        debug!(id = %document.id, terms = entry.length, "Indexing document");
        self.working.insert_entry(document.id.clone(), Arc::new(entry));
        self.changes += 1;
        true
    }

    /// Remove all postings for `id`. Returns whether it was indexed.
    pub fn remove(&mut self, id: &str) -> bool {
        let removed = self.working.remove_entry(id).is_some();
        if removed {
            debug!(id, "Removing document");
            self.changes += 1;
        }
        removed
    }

    /// Remove every document whose id fails `keep`. Returns how many went.
    pub fn retain(&mut self, keep: impl Fn(&str) -> bool) -> usize {
        let doomed: Vec<DocumentId> = self
            .working
            .documents
            .keys()
            .filter(|id| !keep(id))
            .cloned()
            .collect();
        let mut removed = 0;
        for id in &doomed {
            if self.remove(id) {
                removed += 1;
            }
        }
        removed
    }

    /// Number of inserts and removals applied so far.
    pub fn pending_changes(&self) -> usize {
        self.changes
    }

    /// View of the uncommitted state.
    pub fn working(&self) -> &IndexSnapshot {
        &self.working
    }

    /// Publish the working snapshot with the next generation.
    ///
    /// Always bumps the generation, even for an empty batch.
    pub fn commit(mut self) -> u64 {
        self.working.generation += 1;
        self.working.committed = true;
        let generation = self.working.generation;
        info!(
            generation,
            changes = self.changes,
            documents = self.working.doc_count(),
            "Committed lexical index"
        );
        let snapshot = std::mem::take(&mut self.working);
        self.index.publish(snapshot);
        generation
    }
}

#[cfg(test)]
#[path = "index_tests.rs"]
mod tests;
