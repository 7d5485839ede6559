//! Snapshot guard: backups, verification and restore for protected files.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use recall_protocols::content_hash;
use recall_protocols::persist::write_atomic;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::error::GuardError;
use crate::snapshot::{Snapshot, STAMP_FORMAT};
use crate::state::{FileRecord, FileState, GuardState};
use crate::store::SnapshotStore;

/// Guard settings.
#[derive(Debug, Clone)]
pub struct GuardOptions {
    /// Protected paths are relative to this directory.
    pub workspace_root: PathBuf,
    pub protected_files: Vec<String>,
    /// Minimum time between two backups of a changed file.
    pub cooldown: Duration,
    /// Snapshots kept per file. At least one is always kept.
    pub max_snapshots: usize,
    /// Snapshots older than this are pruned, except the newest.
    pub max_age: Option<chrono::Duration>,
    /// Live files are copied here before a restore overwrites them.
    pub quarantine_dir: Option<PathBuf>,
}

impl GuardOptions {
    pub fn new(workspace_root: impl Into<PathBuf>, protected_files: Vec<String>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            protected_files,
            cooldown: Duration::from_secs(900),
            max_snapshots: 20,
            max_age: Some(chrono::Duration::days(30)),
            quarantine_dir: None,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_retention(mut self, max_snapshots: usize, max_age: Option<chrono::Duration>) -> Self {
        self.max_snapshots = max_snapshots;
        self.max_age = max_age;
        self
    }

    pub fn with_quarantine_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.quarantine_dir = Some(dir.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub file: String,
    pub error: String,
}

/// Result of one [`SnapshotGuard::check`] pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    pub backed_up: Vec<Snapshot>,
    /// Not due: unchanged or still cooling down.
    pub skipped: Vec<String>,
    pub missing: Vec<String>,
    /// Corrupt or unrecoverable files that must be restored first.
    pub blocked: Vec<String>,
    pub failed: Vec<FailedFile>,
    pub pruned: usize,
}

/// Outcome of comparing a live file with its latest snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verification {
    Intact,
    /// Differs from the snapshot but matches the caller's expected hash.
    ExpectedEdit,
    Corrupt {
        expected: String,
        actual: Option<String>,
    },
    /// File exists but has never been backed up.
    NoSnapshot,
    /// Neither the file nor a snapshot exists.
    Missing,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileVerification {
    pub file: String,
    pub verification: Verification,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub file: String,
    pub snapshot: Snapshot,
    /// Copy of the replaced live file, if there was one.
    pub quarantined: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecoverOutcome {
    pub file: String,
    pub restored: Option<RestoreReport>,
    pub error: Option<String>,
}

enum BackupOutcome {
    BackedUp(Snapshot, usize),
    Skipped,
    Missing,
    Blocked,
}

/// Per-file state machine over a [`SnapshotStore`].
///
/// Operations on one file are serialized; different files proceed
/// independently. External writers touching a file during a backup or
/// restore are not coordinated with.
pub struct SnapshotGuard {
    options: GuardOptions,
    store: Arc<dyn SnapshotStore>,
    state: Mutex<GuardState>,
    state_path: Option<PathBuf>,
    save_lock: tokio::sync::Mutex<()>,
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

fn validate_relative(file: &str) -> Result<(), GuardError> {
    let path = Path::new(file);
    let valid = !file.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)));
    if valid {
        Ok(())
    } else {
        Err(GuardError::InvalidPath(file.to_string()))
    }
}

impl SnapshotGuard {
    /// Guard with in-memory state.
    pub fn new(options: GuardOptions, store: Arc<dyn SnapshotStore>) -> Result<Self, GuardError> {
        for file in &options.protected_files {
            validate_relative(file)?;
        }
        Ok(Self {
            options,
            store,
            state: Mutex::new(GuardState::default()),
            state_path: None,
            save_lock: tokio::sync::Mutex::new(()),
            locks: DashMap::new(),
        })
    }

    /// Guard whose state is loaded from and saved to `state_path`.
    pub async fn open(
        options: GuardOptions,
        store: Arc<dyn SnapshotStore>,
        state_path: impl Into<PathBuf>,
    ) -> Result<Self, GuardError> {
        let state_path = state_path.into();
        let mut guard = Self::new(options, store)?;
        guard.state = Mutex::new(GuardState::load(&state_path).await?);
        guard.state_path = Some(state_path);
        Ok(guard)
    }

    pub fn options(&self) -> &GuardOptions {
        &self.options
    }

    pub fn record(&self, file: &str) -> FileRecord {
        self.state.lock().record(file)
    }

    /// Record of every protected file, in configuration order.
    pub fn status(&self) -> Vec<(String, FileRecord)> {
        let state = self.state.lock();
        self.options
            .protected_files
            .iter()
            .map(|f| (f.clone(), state.record(f)))
            .collect()
    }

    pub async fn list_snapshots(&self, file: &str) -> Result<Vec<Snapshot>, GuardError> {
        self.ensure_protected(file)?;
        self.store.list(file).await
    }

    /// Back up every protected file that is due.
    ///
    /// A file is due when `force` is set, or when its content differs from
    /// its latest snapshot and the cooldown since its last backup has
    /// elapsed. Failures are reported per file.
    pub async fn check(&self, force: bool) -> Result<CheckReport, GuardError> {
        self.check_at(force, Utc::now()).await
    }

    pub(crate) async fn check_at(
        &self,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<CheckReport, GuardError> {
        let mut report = CheckReport::default();
        for file in &self.options.protected_files {
            match self.backup_one(file, force, now).await {
                Ok(BackupOutcome::BackedUp(snapshot, pruned)) => {
                    report.backed_up.push(snapshot);
                    report.pruned += pruned;
                }
                Ok(BackupOutcome::Skipped) => report.skipped.push(file.clone()),
                Ok(BackupOutcome::Missing) => report.missing.push(file.clone()),
                Ok(BackupOutcome::Blocked) => report.blocked.push(file.clone()),
                Err(e) => {
                    warn!(file = %file, "Backup failed: {}", e);
                    report.failed.push(FailedFile {
                        file: file.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        self.persist().await?;
        info!(
            backed_up = report.backed_up.len(),
            skipped = report.skipped.len(),
            missing = report.missing.len(),
            failed = report.failed.len(),
            pruned = report.pruned,
            "Guard check complete"
        );
        Ok(report)
    }

    async fn backup_one(
        &self,
        file: &str,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<BackupOutcome, GuardError> {
        let lock = self.file_lock(file);
        let _held = lock.lock().await;

        let record = self.record(file);
        if record.state.blocks_backup() {
            return Ok(BackupOutcome::Blocked);
        }

        let bytes = match fs::read(self.live_path(file)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BackupOutcome::Missing),
            Err(e) => {
                self.mark_failed(file, &e.to_string());
                return Err(e.into());
            }
        };

        let hash = content_hash(&bytes);
        let latest = self.store.list(file).await?.pop();
        let changed = latest.as_ref().is_none_or(|s| s.content_hash != hash);
        let cooled = record.last_backup_at.is_none_or(|at| {
            (now - at).to_std().map_or(false, |elapsed| elapsed >= self.options.cooldown)
        });
        let due = force || (changed && (cooled || record.state == FileState::Due));
        if !due {
            return Ok(BackupOutcome::Skipped);
        }

        self.transition(file, |r| r.state = FileState::Due);
        self.transition(file, |r| r.state = FileState::BackingUp);

        match self.store.save(file, &bytes, now).await {
            Ok(snapshot) => {
                self.transition(file, |r| {
                    r.state = FileState::Clean;
                    r.last_backup_at = Some(now);
                    r.last_hash = Some(snapshot.content_hash.clone());
                    r.last_error = None;
                });
                info!(file = %file, hash = %snapshot.content_hash, "Backed up protected file");
                let pruned = self.prune(file, now).await;
                Ok(BackupOutcome::BackedUp(snapshot, pruned))
            }
            Err(e) => {
                self.mark_failed(file, &e.to_string());
                Err(e)
            }
        }
    }

    /// Apply retention to `file`. Never removes the newest snapshot.
    async fn prune(&self, file: &str, now: DateTime<Utc>) -> usize {
        let snapshots = match self.store.list(file).await {
            Ok(s) => s,
            Err(e) => {
                warn!(file = %file, "Listing snapshots for retention failed: {}", e);
                return 0;
            }
        };
        if snapshots.len() <= 1 {
            return 0;
        }

        let keep = self.options.max_snapshots.max(1);
        let excess = snapshots.len().saturating_sub(keep);
        let newest = snapshots.len() - 1;
        let mut pruned = 0;

        for (i, snapshot) in snapshots.iter().enumerate().take(newest) {
            let too_many = i < excess;
            let too_old = self.options.max_age.is_some_and(|age| now - snapshot.taken_at > age);
            if !too_many && !too_old {
                continue;
            }
            match self.store.delete(snapshot).await {
                Ok(()) => pruned += 1,
                Err(e) => {
                    warn!(file = %file, "Pruning snapshot failed: {}", e);
                    break;
                }
            }
        }
        if pruned > 0 {
            debug!(file = %file, pruned, "Pruned snapshots");
        }
        pruned
    }

    /// Compare the live file against its latest snapshot.
    ///
    /// Call at a checkpoint boundary, e.g. before a known-destructive
    /// external operation. A mismatch that is not `expected_hash` moves the
    /// file to `CorruptDetected`; a match with `expected_hash` releases a
    /// flagged file and marks it `Due`.
    pub async fn verify(
        &self,
        file: &str,
        expected_hash: Option<&str>,
    ) -> Result<Verification, GuardError> {
        self.ensure_protected(file)?;
        let lock = self.file_lock(file);
        let held = lock.lock().await;

        let latest = self.store.list(file).await?.pop();
        let live = match fs::read(self.live_path(file)).await {
            Ok(bytes) => Some(content_hash(&bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let verification = match (latest, live) {
            (None, None) => Verification::Missing,
            (None, Some(_)) => Verification::NoSnapshot,
            (Some(snapshot), Some(actual)) if actual == snapshot.content_hash => {
                self.transition(file, |r| {
                    if r.state == FileState::CorruptDetected {
                        r.state = FileState::Clean;
                    }
                });
                Verification::Intact
            }
            (Some(_), Some(actual)) if expected_hash == Some(actual.as_str()) => {
                // The accepted content becomes the next snapshot.
                self.transition(file, |r| {
                    if matches!(r.state, FileState::Clean | FileState::CorruptDetected) {
                        r.state = FileState::Due;
                    }
                });
                Verification::ExpectedEdit
            }
            (Some(snapshot), actual) => {
                warn!(
                    file = %file,
                    expected = %snapshot.content_hash,
                    actual = actual.as_deref().unwrap_or("<missing>"),
                    "Protected file does not match its latest snapshot"
                );
                self.transition(file, |r| {
                    if r.state != FileState::Unrecoverable {
                        r.state = FileState::CorruptDetected;
                    }
                });
                Verification::Corrupt {
                    expected: snapshot.content_hash,
                    actual,
                }
            }
        };

        drop(held);
        self.persist().await?;
        Ok(verification)
    }

    /// Verify every protected file.
    pub async fn verify_all(&self) -> Result<Vec<FileVerification>, GuardError> {
        let mut results = Vec::with_capacity(self.options.protected_files.len());
        for file in &self.options.protected_files {
            let verification = self.verify(file, None).await?;
            results.push(FileVerification {
                file: file.clone(),
                verification,
            });
        }
        Ok(results)
    }

    /// Overwrite the live file with a snapshot and verify the result.
    ///
    /// Without `timestamp` the newest snapshot whose bytes still match its
    /// recorded hash is used. With `timestamp` the newest snapshot whose
    /// stamp starts with it is used as is. A failed verification leaves the
    /// file `Unrecoverable` and is never retried.
    pub async fn restore(
        &self,
        file: &str,
        timestamp: Option<&str>,
    ) -> Result<RestoreReport, GuardError> {
        self.ensure_protected(file)?;
        let lock = self.file_lock(file);
        let held = lock.lock().await;

        let result = self.restore_locked(file, timestamp).await;
        drop(held);
        self.persist().await?;
        result
    }

    async fn restore_locked(
        &self,
        file: &str,
        timestamp: Option<&str>,
    ) -> Result<RestoreReport, GuardError> {
        let (snapshot, bytes) = self.select_snapshot(file, timestamp).await?;
        let previous = self.record(file).state;
        self.transition(file, |r| r.state = FileState::Restoring);

        let live = self.live_path(file);
        let quarantined = match self.quarantine(file, &live).await {
            Ok(path) => path,
            Err(e) => {
                self.transition(file, |r| {
                    r.state = previous;
                    r.last_error = Some(e.to_string());
                });
                return Err(e);
            }
        };

        if let Err(e) = write_atomic(&live, &bytes).await {
            self.transition(file, |r| {
                r.state = FileState::CorruptDetected;
                r.last_error = Some(e.to_string());
            });
            return Err(e.into());
        }

        let actual = match fs::read(&live).await {
            Ok(written) => content_hash(&written),
            Err(e) => format!("<unreadable: {}>", e),
        };
        if actual != snapshot.content_hash {
            let err = GuardError::RestoreVerification {
                file: file.to_string(),
                expected: snapshot.content_hash.clone(),
                actual,
            };
            error!(file = %file, "{}", err);
            self.transition(file, |r| {
                r.state = FileState::Unrecoverable;
                r.last_error = Some(err.to_string());
            });
            return Err(err);
        }

        self.transition(file, |r| {
            r.state = FileState::Clean;
            r.last_hash = Some(snapshot.content_hash.clone());
            r.last_error = None;
        });
        info!(file = %file, snapshot = %snapshot.stamp(), "Restored protected file");
        Ok(RestoreReport {
            file: file.to_string(),
            snapshot,
            quarantined,
        })
    }

    async fn select_snapshot(
        &self,
        file: &str,
        timestamp: Option<&str>,
    ) -> Result<(Snapshot, Vec<u8>), GuardError> {
        let snapshots = self.store.list(file).await?;

        if let Some(ts) = timestamp {
            let snapshot = snapshots
                .into_iter()
                .rev()
                .find(|s| s.matches_stamp(ts))
                .ok_or_else(|| GuardError::SnapshotNotFound {
                    file: file.to_string(),
                    timestamp: ts.to_string(),
                })?;
            let bytes = self.store.read(&snapshot).await?;
            return Ok((snapshot, bytes));
        }

        for snapshot in snapshots.into_iter().rev() {
            match self.store.read(&snapshot).await {
                Ok(bytes) if content_hash(&bytes) == snapshot.content_hash => {
                    return Ok((snapshot, bytes));
                }
                Ok(_) => warn!(file = %file, snapshot = %snapshot.stamp(), "Skipping damaged snapshot"),
                Err(e) => warn!(file = %file, snapshot = %snapshot.stamp(), "Skipping unreadable snapshot: {}", e),
            }
        }
        Err(GuardError::NoSnapshot(file.to_string()))
    }

    async fn quarantine(&self, file: &str, live: &Path) -> Result<Option<PathBuf>, GuardError> {
        let Some(dir) = &self.options.quarantine_dir else {
            return Ok(None);
        };
        let bytes = match fs::read(live).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let name = format!(
            "{}.{}",
            file.replace('/', "_"),
            Utc::now().format(STAMP_FORMAT)
        );
        let path = dir.join(name);
        write_atomic(&path, &bytes).await?;
        debug!(file = %file, path = %path.display(), "Quarantined live file");
        Ok(Some(path))
    }

    /// Restore every file currently in `CorruptDetected`.
    pub async fn recover(&self) -> Result<Vec<RecoverOutcome>, GuardError> {
        let corrupt: Vec<String> = self
            .status()
            .into_iter()
            .filter(|(_, r)| r.state == FileState::CorruptDetected)
            .map(|(f, _)| f)
            .collect();

        let mut outcomes = Vec::with_capacity(corrupt.len());
        for file in corrupt {
            let outcome = match self.restore(&file, None).await {
                Ok(report) => RecoverOutcome {
                    file,
                    restored: Some(report),
                    error: None,
                },
                Err(e) => RecoverOutcome {
                    file,
                    restored: None,
                    error: Some(e.to_string()),
                },
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    fn ensure_protected(&self, file: &str) -> Result<(), GuardError> {
        if self.options.protected_files.iter().any(|f| f == file) {
            Ok(())
        } else {
            Err(GuardError::NotProtected(file.to_string()))
        }
    }

    fn live_path(&self, file: &str) -> PathBuf {
        self.options.workspace_root.join(file)
    }

    fn file_lock(&self, file: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.entry(file.to_string()).or_default().clone()
    }

    fn mark_failed(&self, file: &str, message: &str) {
        self.transition(file, |r| {
            r.state = FileState::Due;
            r.last_error = Some(message.to_string());
        });
    }

    fn transition(&self, file: &str, update: impl FnOnce(&mut FileRecord)) {
        let mut state = self.state.lock();
        let record = state.record_mut(file);
        let from = record.state;
        update(record);
        if record.state != from {
            debug!(file = %file, from = %from, to = %record.state, "Guard state transition");
        }
    }

    async fn persist(&self) -> Result<(), GuardError> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        let _saving = self.save_lock.lock().await;
        let state = self.state.lock().clone();
        state.save(path).await
    }
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;
