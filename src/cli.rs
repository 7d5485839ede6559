//! CLI definitions for recall.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use recall_hybrid::Rating;

/// Recall CLI.
#[derive(Parser)]
#[command(name = "recall")]
#[command(about = "Hybrid lexical and semantic retrieval over a personal knowledge base")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path (default: ~/.recall/config.toml)
    #[arg(short, long, global = true, env = "RECALL_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Search the knowledge base
    Query {
        /// Query text
        text: String,

        /// Number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Weight of keyword scoring, 0 to 1
        #[arg(long)]
        lexical_weight: Option<f32>,

        /// Weight of semantic similarity, 0 to 1
        #[arg(long)]
        vector_weight: Option<f32>,

        /// Bypass the query cache
        #[arg(long)]
        no_cache: bool,

        /// Accept results cached for a similar query
        #[arg(long)]
        approximate: bool,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Show index generation, cache statistics and pending changes
    Status {
        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Bring the index in line with the source directory
    Reconcile {
        /// Discard the manifest and re-index every document
        #[arg(long)]
        full: bool,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Recent queries, most frequent queries and feedback totals
    History {
        /// Number of recent queries to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Show most frequent queries and feedback totals instead
        #[arg(long)]
        stats: bool,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Rate the results of an earlier query
    Feedback {
        /// Record id, or a unique prefix of it, as printed by `query`
        id: String,

        /// helpful, not_helpful or partial
        rating: Rating,

        /// Free-form comment
        comment: Option<String>,
    },

    /// Query cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Snapshot guard for protected files
    Guard {
        #[command(subcommand)]
        action: GuardAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// Show hit rate and counters
    Stats,

    /// Drop expired and stale entries and enforce the size bound
    Sweep,

    /// Drop every entry
    Clear,

    /// Most frequently hit queries
    Popular {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Drop entries for one query
    Invalidate {
        /// Query text
        query: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum GuardAction {
    /// Back up protected files that are due
    Check {
        /// Back up every file regardless of cooldown or changes
        #[arg(long)]
        force: bool,
    },

    /// Compare protected files against their latest snapshots
    Verify {
        /// Only this file
        #[arg(long)]
        file: Option<String>,

        /// Hash of an intended edit to accept for --file
        #[arg(long, requires = "file")]
        expected: Option<String>,
    },

    /// Restore every file found corrupt
    Recover,

    /// List snapshots
    List {
        /// Only this file
        file: Option<String>,
    },

    /// Restore a file from a snapshot
    Restore {
        /// Protected file, relative to the workspace root
        file: String,

        /// Snapshot timestamp prefix (YYYYmmdd_HHMMSS)
        #[arg(long)]
        timestamp: Option<String>,
    },

    /// Show per-file guard state
    Status,
}
