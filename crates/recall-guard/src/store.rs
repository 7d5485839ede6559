//! Snapshot storage.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recall_protocols::content_hash;
use recall_protocols::persist::write_atomic;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::GuardError;
use crate::snapshot::Snapshot;

/// Append-only snapshot storage, one ordered sequence per protected file.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Store `bytes` as a new snapshot of `file`.
    async fn save(
        &self,
        file: &str,
        bytes: &[u8],
        taken_at: DateTime<Utc>,
    ) -> Result<Snapshot, GuardError>;

    /// Snapshots of `file`, oldest first.
    async fn list(&self, file: &str) -> Result<Vec<Snapshot>, GuardError>;

    /// Stored bytes of `snapshot`.
    async fn read(&self, snapshot: &Snapshot) -> Result<Vec<u8>, GuardError>;

    /// Delete one snapshot.
    async fn delete(&self, snapshot: &Snapshot) -> Result<(), GuardError>;
}

fn sort_oldest_first(snapshots: &mut [Snapshot]) {
    snapshots.sort_by(|a, b| {
        a.taken_at
            .cmp(&b.taken_at)
            .then_with(|| a.content_hash.cmp(&b.content_hash))
    });
}

/// In-memory snapshot store for testing.
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: tokio::sync::RwLock<HashMap<String, Vec<(Snapshot, Vec<u8>)>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored bytes of `snapshot`, keeping its recorded hash.
    pub async fn tamper(&self, snapshot: &Snapshot, bytes: Vec<u8>) {
        let mut store = self.snapshots.write().await;
        if let Some(entries) = store.get_mut(&snapshot.file) {
            for (snap, data) in entries.iter_mut() {
                if snap == snapshot {
                    *data = bytes.clone();
                }
            }
        }
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(
        &self,
        file: &str,
        bytes: &[u8],
        taken_at: DateTime<Utc>,
    ) -> Result<Snapshot, GuardError> {
        let snapshot = Snapshot {
            file: file.to_string(),
            taken_at,
            content_hash: content_hash(bytes),
            size: bytes.len() as u64,
        };
        let mut store = self.snapshots.write().await;
        store
            .entry(file.to_string())
            .or_default()
            .push((snapshot.clone(), bytes.to_vec()));
        Ok(snapshot)
    }

    async fn list(&self, file: &str) -> Result<Vec<Snapshot>, GuardError> {
        let store = self.snapshots.read().await;
        let mut snapshots: Vec<Snapshot> = store
            .get(file)
            .map(|entries| entries.iter().map(|(s, _)| s.clone()).collect())
            .unwrap_or_default();
        sort_oldest_first(&mut snapshots);
        Ok(snapshots)
    }

    async fn read(&self, snapshot: &Snapshot) -> Result<Vec<u8>, GuardError> {
        let store = self.snapshots.read().await;
        store
            .get(&snapshot.file)
            .and_then(|entries| entries.iter().find(|(s, _)| s == snapshot))
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| GuardError::NoSnapshot(snapshot.file.clone()))
    }

    async fn delete(&self, snapshot: &Snapshot) -> Result<(), GuardError> {
        let mut store = self.snapshots.write().await;
        if let Some(entries) = store.get_mut(&snapshot.file) {
            entries.retain(|(s, _)| s != snapshot);
        }
        Ok(())
    }
}

/// File system snapshot store.
///
/// Each protected file gets its own directory under the root:
/// ```text
/// {root}/
/// └── knowledge/README.md/
///     ├── 20260301_120000_000000_{sha256}.bak
///     └── ...
/// ```
pub struct FileSnapshotStore {
    root: PathBuf,
}

impl FileSnapshotStore {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, GuardError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        debug!("FileSnapshotStore initialized at {:?}", root);
        Ok(Self { root })
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn file_dir(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }

    fn snapshot_path(&self, snapshot: &Snapshot) -> PathBuf {
        self.file_dir(&snapshot.file).join(snapshot.file_name())
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(
        &self,
        file: &str,
        bytes: &[u8],
        taken_at: DateTime<Utc>,
    ) -> Result<Snapshot, GuardError> {
        let snapshot = Snapshot {
            file: file.to_string(),
            taken_at,
            content_hash: content_hash(bytes),
            size: bytes.len() as u64,
        };
        let path = self.snapshot_path(&snapshot);
        write_atomic(&path, bytes).await?;
        debug!("Saved snapshot of '{}' to {:?}", file, path);
        Ok(snapshot)
    }

    async fn list(&self, file: &str) -> Result<Vec<Snapshot>, GuardError> {
        let dir = self.file_dir(file);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut snapshots = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
            match Snapshot::parse_file_name(file, name, size) {
                Some(snapshot) => snapshots.push(snapshot),
                None if name.ends_with(".bak") => {
                    warn!("Ignoring unrecognised snapshot file {:?}", entry.path());
                }
                None => {}
            }
        }

        sort_oldest_first(&mut snapshots);
        Ok(snapshots)
    }

    async fn read(&self, snapshot: &Snapshot) -> Result<Vec<u8>, GuardError> {
        match fs::read(self.snapshot_path(snapshot)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(GuardError::NoSnapshot(snapshot.file.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, snapshot: &Snapshot) -> Result<(), GuardError> {
        let path = self.snapshot_path(snapshot);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted snapshot {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
