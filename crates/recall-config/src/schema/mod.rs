//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::loader::ConfigLoader;

mod schema_guard;
mod schema_search;

pub use schema_guard::*;
pub use schema_search::*;

/// Shared default helper used by submodules.
pub(crate) fn default_true() -> bool {
    true
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub indexer: IndexerConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub guard: GuardConfig,
}

/// Locations of the knowledge base and of recall's own state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Workspace root; protected files are relative to it.
    #[serde(default = "default_root")]
    pub root: String,

    /// Directory scanned by the indexer, relative to `root` unless absolute.
    #[serde(default = "default_source_dir")]
    pub source_dir: String,

    /// Manifest, index, cache, history, vectors and guard state live here.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            source_dir: default_source_dir(),
            state_dir: default_state_dir(),
        }
    }
}

impl WorkspaceConfig {
    pub fn root_path(&self) -> PathBuf {
        PathBuf::from(ConfigLoader::expand_path(&self.root))
    }

    pub fn source_path(&self) -> PathBuf {
        resolve_under(&self.root_path(), &self.source_dir)
    }

    pub fn state_path(&self) -> PathBuf {
        PathBuf::from(ConfigLoader::expand_path(&self.state_dir))
    }
}

/// Expand `~` in `path` and join it onto `base` when relative.
pub(crate) fn resolve_under(base: &Path, path: &str) -> PathBuf {
    let expanded = PathBuf::from(ConfigLoader::expand_path(path));
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

fn default_root() -> String {
    "~/.openclaw/workspace".to_string()
}

fn default_source_dir() -> String {
    "memory".to_string()
}

fn default_state_dir() -> String {
    "~/.recall".to_string()
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
