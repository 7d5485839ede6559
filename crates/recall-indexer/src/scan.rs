//! Source directory walk and change classification.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use recall_lexical::IndexSnapshot;
use recall_protocols::{content_hash, Document, DocumentId};
use serde::Serialize;
use tokio::fs;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::IndexerError;
use crate::manifest::Manifest;

/// Which files under the source directory are documents.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Extensions without the dot, compared case-insensitively.
    pub extensions: Vec<String>,
    /// 1 means files directly inside the source directory only.
    pub max_depth: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            extensions: vec!["md".to_string()],
            max_depth: 1,
        }
    }
}

impl ScanOptions {
    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
    }
}

/// A document file found by the walk.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub id: DocumentId,
    pub path: PathBuf,
    pub modified_at: DateTime<Utc>,
}

/// Relative path with `/` separators, or `None` if `path` escapes `root`.
pub fn document_id(root: &Path, path: &Path) -> Option<DocumentId> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            _ => return None,
        }
    }
    (!parts.is_empty()).then(|| parts.join("/"))
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}

/// Result of walking the source directory.
#[derive(Debug, Default)]
pub struct Walk {
    /// Document files, sorted by id.
    pub files: Vec<SourceFile>,
    /// Relative paths the walk could not read. An empty string stands for
    /// the whole source directory.
    pub unreadable: Vec<DocumentId>,
}

impl Walk {
    pub fn errors(&self) -> usize {
        self.unreadable.len()
    }

    /// Whether `id` lies at or under a path the walk could not read.
    ///
    /// Such documents may still exist on disk, so their indexed state must
    /// not be dropped.
    pub fn is_shadowed(&self, id: &str) -> bool {
        self.unreadable.iter().any(|prefix| {
            prefix.is_empty()
                || id == prefix.as_str()
                || id.strip_prefix(prefix.as_str()).is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

/// Walk `root` on a blocking thread.
pub async fn walk(root: &Path, options: &ScanOptions) -> Result<Walk, IndexerError> {
    if !fs::metadata(root).await.map(|m| m.is_dir()).unwrap_or(false) {
        return Err(IndexerError::SourceMissing(root.to_path_buf()));
    }

    let root = root.to_path_buf();
    let options = options.clone();
    tokio::task::spawn_blocking(move || {
        let mut walk = Walk::default();

        let walker = WalkDir::new(&root)
            .min_depth(1)
            .max_depth(options.max_depth.max(1))
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    let prefix = e.path().and_then(|p| document_id(&root, p)).unwrap_or_default();
                    walk.unreadable.push(prefix);
                    continue;
                }
            };
            // Symlinks are kept so a dangling link is reported as unreadable.
            let candidate = entry.file_type().is_file() || entry.path_is_symlink();
            if !candidate || !options.matches(entry.path()) {
                continue;
            }
            let Some(id) = document_id(&root, entry.path()) else {
                continue;
            };
            let modified_at = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(Utc::now);
            walk.files.push(SourceFile {
                id,
                path: entry.into_path(),
                modified_at,
            });
        }

        walk.files.sort_by(|a, b| a.id.cmp(&b.id));
        walk
    })
    .await
    .map_err(|e| IndexerError::Walk(e.to_string()))
}

/// A document whose postings must be (re)built.
#[derive(Debug, Clone)]
pub struct Change {
    pub document: Document,
    pub is_new: bool,
}

/// Differences between the source directory and the manifest.
#[derive(Debug, Default)]
pub struct Plan {
    pub changes: Vec<Change>,
    /// Ids with a hash matching the manifest, and their current mtime.
    pub unchanged: Vec<(DocumentId, DateTime<Utc>)>,
    pub removed: Vec<DocumentId>,
    /// Unreadable documents, and known documents under an unreadable
    /// directory. Their indexed state is kept as is.
    pub skipped: Vec<DocumentId>,
    pub walk_errors: usize,
}

impl Plan {
    pub fn added(&self) -> usize {
        self.changes.iter().filter(|c| c.is_new).count()
    }

    pub fn updated(&self) -> usize {
        self.changes.len() - self.added()
    }
}

/// Walk `root`, then read and hash every file and compare against `manifest`.
pub async fn plan(
    root: &Path,
    options: &ScanOptions,
    manifest: &Manifest,
    snapshot: &IndexSnapshot,
) -> Result<Plan, IndexerError> {
    let walk = walk(root, options).await?;
    Ok(classify(walk, manifest, snapshot).await)
}

/// Compare walked files against `manifest`.
///
/// Documents indexed in `snapshot` but unknown to both the manifest and
/// the directory are also scheduled for removal. Known documents under an
/// unreadable path are skipped rather than removed.
pub async fn classify(walk: Walk, manifest: &Manifest, snapshot: &IndexSnapshot) -> Plan {
    let mut plan = Plan {
        walk_errors: walk.errors(),
        ..Plan::default()
    };
    let mut present: BTreeSet<DocumentId> = BTreeSet::new();

    for file in &walk.files {
        present.insert(file.id.clone());
        let bytes = match fs::read(&file.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(id = %file.id, "Skipping unreadable document: {}", e);
                plan.skipped.push(file.id.clone());
                continue;
            }
        };

        let hash = content_hash(&bytes);
        let previous = manifest.get(&file.id).map(|e| e.content_hash.as_str());
        if previous == Some(hash.as_str()) {
            plan.unchanged.push((file.id.clone(), file.modified_at));
            continue;
        }

        let content = String::from_utf8(bytes).unwrap_or_else(|_| {
            warn!(id = %file.id, "Document is not valid UTF-8, indexing as empty");
            String::new()
        });
        debug!(id = %file.id, new = previous.is_none(), "Document changed");
        plan.changes.push(Change {
            document: Document::with_hash(file.id.clone(), content, file.modified_at, hash),
            is_new: previous.is_none(),
        });
    }

    let mut missing: BTreeSet<DocumentId> = manifest
        .entries
        .keys()
        .filter(|id| !present.contains(*id))
        .cloned()
        .collect();
    missing.extend(
        snapshot
            .document_ids()
            .into_iter()
            .filter(|id| !present.contains(*id))
            .cloned(),
    );
    for id in missing {
        if walk.is_shadowed(&id) {
            debug!(id = %id, "Keeping document under unreadable path");
            plan.skipped.push(id);
        } else {
            plan.removed.push(id);
        }
    }

    plan
}

/// Pending changes without committing anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PendingChanges {
    pub added: Vec<DocumentId>,
    pub updated: Vec<DocumentId>,
    pub removed: Vec<DocumentId>,
    pub unchanged: usize,
    pub skipped: usize,
}

impl PendingChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

impl From<&Plan> for PendingChanges {
    fn from(plan: &Plan) -> Self {
        let (added, updated): (Vec<_>, Vec<_>) = plan.changes.iter().partition(|c| c.is_new);
        Self {
            added: added.into_iter().map(|c| c.document.id.clone()).collect(),
            updated: updated.into_iter().map(|c| c.document.id.clone()).collect(),
            removed: plan.removed.clone(),
            unchanged: plan.unchanged.len(),
            skipped: plan.skipped.len() + plan.walk_errors,
        }
    }
}

#[cfg(test)]
#[path = "scan_tests.rs"]
mod tests;
