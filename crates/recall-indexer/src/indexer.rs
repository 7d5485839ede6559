//! Reconciliation of the lexical index with the source directory.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use recall_lexical::{save_index, LexicalIndex};
use recall_protocols::EmbeddingSink;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::IndexerError;
use crate::manifest::{Manifest, ManifestEntry};
use crate::scan::{self, PendingChanges, Plan, ScanOptions};

/// Outcome of one [`Indexer::reconcile`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
    /// Documents that could not be read; their previous state is kept.
    pub skipped: usize,
    pub embed_failures: usize,
    /// Generation published by this run.
    pub generation: u64,
}

impl ReconcileReport {
    pub fn has_changes(&self) -> bool {
        self.added + self.updated + self.removed > 0
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "added {}, updated {}, removed {} (unchanged {}, skipped {}) -> generation {}",
            self.added, self.updated, self.removed, self.unchanged, self.skipped, self.generation
        )?;
        if self.embed_failures > 0 {
            write!(f, ", {} embedding failures", self.embed_failures)?;
        }
        Ok(())
    }
}

/// Single writer for the lexical index.
///
/// Runs are serialized; queries keep reading the previous snapshot until
/// the run commits.
pub struct Indexer {
    index: Arc<LexicalIndex>,
    options: ScanOptions,
    manifest: Mutex<Manifest>,
    manifest_path: Option<PathBuf>,
    index_path: Option<PathBuf>,
    sink: Option<Arc<dyn EmbeddingSink>>,
}

impl Indexer {
    /// Indexer with an in-memory manifest derived from `index`.
    pub fn new(index: Arc<LexicalIndex>, options: ScanOptions) -> Self {
        let manifest = Manifest::from_snapshot(&index.snapshot());
        Self {
            index,
            options,
            manifest: Mutex::new(manifest),
            manifest_path: None,
            index_path: None,
            sink: None,
        }
    }

    /// Indexer whose manifest is loaded from and saved to `manifest_path`.
    ///
    /// A manifest whose generation differs from `index` (e.g. after a crash
    /// between the two writes) is discarded and rebuilt from the index. When
    /// the manifest is ahead, the index state it described was lost, so the
    /// index generation is first moved past the manifest's. Stamps issued
    /// before the loss then never match a later generation.
    pub async fn open(
        index: Arc<LexicalIndex>,
        options: ScanOptions,
        manifest_path: impl Into<PathBuf>,
    ) -> Result<Self, IndexerError> {
        let manifest_path = manifest_path.into();
        let mut manifest = Manifest::load(&manifest_path).await?;
        let mut generation = index.generation();
        if manifest.generation > generation {
            generation = index.advance_past(manifest.generation);
        }
        if manifest.generation != generation {
            warn!(
                manifest = manifest.generation,
                index = generation,
                "Manifest does not match lexical index, rebuilding from index"
            );
            manifest = Manifest::from_snapshot(&index.snapshot());
        }
        debug!(entries = manifest.len(), "Loaded manifest");

        Ok(Self {
            index,
            options,
            manifest: Mutex::new(manifest),
            manifest_path: Some(manifest_path),
            index_path: None,
            sink: None,
        })
    }

    /// Save the lexical index to `path` after each commit.
    pub fn with_index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_path = Some(path.into());
        self
    }

    /// Forward changed and removed documents to `sink` after each commit.
    pub fn with_sink(mut self, sink: Arc<dyn EmbeddingSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn index(&self) -> &Arc<LexicalIndex> {
        &self.index
    }

    pub async fn manifest(&self) -> Manifest {
        self.manifest.lock().await.clone()
    }

    /// Changes the next reconcile would apply.
    pub async fn scan(&self, source_dir: &Path) -> Result<PendingChanges, IndexerError> {
        let manifest = self.manifest.lock().await;
        let plan = scan::plan(source_dir, &self.options, &manifest, &self.index.snapshot()).await?;
        Ok(PendingChanges::from(&plan))
    }

    /// Bring the index in line with `source_dir` and commit once.
    pub async fn reconcile(&self, source_dir: &Path) -> Result<ReconcileReport, IndexerError> {
        let mut manifest = self.manifest.lock().await;
        let plan = scan::plan(source_dir, &self.options, &manifest, &self.index.snapshot()).await?;

        let generation = {
            let mut writer = self.index.writer();
            for change in &plan.changes {
                writer.index(&change.document);
            }
            for id in &plan.removed {
                writer.remove(id);
            }
            writer.commit()
        };

        let report = self.finish(&mut manifest, &plan, generation).await?;
        info!(
            added = report.added,
            updated = report.updated,
            removed = report.removed,
            unchanged = report.unchanged,
            skipped = report.skipped,
            generation,
            "Reconciled source directory"
        );
        Ok(report)
    }

    /// Discard the manifest and re-index every readable document.
    ///
    /// Commits one generation above the current one. Documents that cannot
    /// be read keep their previous entries; everything else indexed but
    /// absent from `source_dir` is dropped. Every re-indexed document is
    /// reported as added.
    pub async fn rebuild(&self, source_dir: &Path) -> Result<ReconcileReport, IndexerError> {
        let mut manifest = self.manifest.lock().await;
        let walk = scan::walk(source_dir, &self.options).await?;
        let plan = scan::classify(walk, &Manifest::default(), &self.index.snapshot()).await;
        let kept: HashSet<&str> = plan.skipped.iter().map(String::as_str).collect();

        let generation = {
            let mut writer = self.index.writer();
            writer.retain(|id| kept.contains(id));
            for change in &plan.changes {
                writer.index(&change.document);
            }
            writer.commit()
        };

        manifest.entries.retain(|id, _| kept.contains(id.as_str()));
        let report = self.finish(&mut manifest, &plan, generation).await?;
        info!(
            documents = report.added,
            skipped = report.skipped,
            generation,
            "Rebuilt lexical index"
        );
        Ok(report)
    }

    /// Record a committed plan in the manifest, persist, and notify the sink.
    async fn finish(
        &self,
        manifest: &mut Manifest,
        plan: &Plan,
        generation: u64,
    ) -> Result<ReconcileReport, IndexerError> {
        apply_to_manifest(manifest, plan, generation);
        self.persist(manifest).await?;

        let embed_failures = match &self.sink {
            Some(sink) => forward_to_sink(sink.as_ref(), plan).await,
            None => 0,
        };

        Ok(ReconcileReport {
            added: plan.added(),
            updated: plan.updated(),
            removed: plan.removed.len(),
            unchanged: plan.unchanged.len(),
            skipped: plan.skipped.len() + plan.walk_errors,
            embed_failures,
            generation,
        })
    }

    async fn persist(&self, manifest: &Manifest) -> Result<(), IndexerError> {
        // Index first: a manifest newer than the index would hide changes.
        if let Some(path) = &self.index_path {
            save_index(&self.index.snapshot(), path).await?;
        }
        if let Some(path) = &self.manifest_path {
            manifest.save(path).await?;
        }
        Ok(())
    }
}

fn apply_to_manifest(manifest: &mut Manifest, plan: &Plan, generation: u64) {
    let now = Utc::now();
    for change in &plan.changes {
        let doc = &change.document;
        manifest.entries.insert(
            doc.id.clone(),
            ManifestEntry {
                content_hash: doc.content_hash.clone(),
                modified_at: doc.modified_at,
                indexed_at: now,
            },
        );
    }
    for (id, modified_at) in &plan.unchanged {
        if let Some(entry) = manifest.entries.get_mut(id) {
            entry.modified_at = *modified_at;
        }
    }
    for id in &plan.removed {
        manifest.entries.remove(id);
    }
    manifest.generation = generation;
}

async fn forward_to_sink(sink: &dyn EmbeddingSink, plan: &Plan) -> usize {
    let mut failures = 0;
    for change in &plan.changes {
        if let Err(e) = sink.upsert(&change.document).await {
            warn!(id = %change.document.id, "Re-embedding failed: {}", e);
            failures += 1;
        }
    }
    for id in &plan.removed {
        if let Err(e) = sink.remove(id).await {
            warn!(id = %id, "Removing embeddings failed: {}", e);
            failures += 1;
        }
    }
    if let Err(e) = sink.flush().await {
        warn!("Flushing embeddings failed: {}", e);
        failures += 1;
    }
    failures
}

#[cfg(test)]
#[path = "indexer_tests.rs"]
mod tests;
