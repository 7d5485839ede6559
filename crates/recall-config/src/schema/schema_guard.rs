//! Snapshot guard configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::loader::ConfigLoader;

/// Snapshot guard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Where snapshots are written.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,

    /// Files under the workspace root that the guard protects.
    #[serde(default = "default_protected_files")]
    pub protected_files: Vec<String>,

    /// Minimum seconds between two automatic backups of the same file.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Snapshots kept per file.
    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: usize,

    /// Snapshots older than this many days are pruned; 0 keeps them by count only.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            backup_dir: default_backup_dir(),
            protected_files: default_protected_files(),
            cooldown_secs: default_cooldown_secs(),
            max_snapshots: default_max_snapshots(),
            max_age_days: default_max_age_days(),
        }
    }
}

impl GuardConfig {
    pub fn backup_path(&self) -> PathBuf {
        PathBuf::from(ConfigLoader::expand_path(&self.backup_dir))
    }
}

fn default_backup_dir() -> String {
    "~/.recall/backups".to_string()
}

fn default_protected_files() -> Vec<String> {
    [
        "SESSION-STATE.md",
        "MEMORY.md",
        "SOUL.md",
        "USER.md",
        "knowledge/README.md",
        "knowledge/INDEX.md",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_cooldown_secs() -> u64 {
    15 * 60
}

fn default_max_snapshots() -> usize {
    20
}

fn default_max_age_days() -> u32 {
    30
}
