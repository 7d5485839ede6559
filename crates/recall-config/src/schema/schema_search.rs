//! Retrieval-related configuration types.

use serde::{Deserialize, Serialize};

use super::default_true;

/// Default query parameters. Each query still receives its own weights;
/// these only seed the CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f32,

    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Upper bound on the vector sub-query, in milliseconds.
    #[serde(default = "default_vector_timeout_ms")]
    pub vector_timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            lexical_weight: default_lexical_weight(),
            vector_weight: default_vector_weight(),
            top_k: default_top_k(),
            vector_timeout_ms: default_vector_timeout_ms(),
        }
    }
}

fn default_lexical_weight() -> f32 {
    0.3
}

fn default_vector_weight() -> f32 {
    0.7
}

fn default_top_k() -> usize {
    5
}

fn default_vector_timeout_ms() -> u64 {
    2000
}

/// Query cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Enable the near-duplicate lookup tier.
    #[serde(default = "default_true")]
    pub near_duplicate: bool,

    /// Minimum token overlap for a near-duplicate hit.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Number of recent queries kept for near-duplicate matching.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
            near_duplicate: true,
            similarity_threshold: default_similarity_threshold(),
            history_size: default_history_size(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_max_entries() -> usize {
    100
}

fn default_similarity_threshold() -> f32 {
    0.8
}

fn default_history_size() -> usize {
    64
}

/// Query log and feedback configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Most recent queries kept with their results and feedback.
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_records: default_max_records(),
        }
    }
}

fn default_max_records() -> usize {
    100
}

/// Incremental indexer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// File extensions (without dot) that are indexed.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Walk depth below the source directory; 1 means direct children only.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Re-embed changed documents after each reconcile.
    #[serde(default = "default_true")]
    pub embed_on_change: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            max_depth: default_max_depth(),
            embed_on_change: true,
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec!["md".to_string()]
}

fn default_max_depth() -> usize {
    1
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "none" or "ollama".
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_dimension")]
    pub dimension: usize,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Input is truncated to this many characters before embedding.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            dimension: default_dimension(),
            timeout_ms: default_timeout_ms(),
            max_chars: default_max_chars(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "none"
    }
}

fn default_provider() -> String {
    "none".to_string()
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "mxbai-embed-large".to_string()
}

fn default_dimension() -> usize {
    1024
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_chars() -> usize {
    2000
}
