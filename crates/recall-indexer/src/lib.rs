//! # Recall Indexer
//!
//! Keeps the lexical index in line with a directory of source documents.
//! Each [`Indexer::reconcile`] hashes every file, compares against the
//! persisted [`Manifest`], rebuilds postings only for the changed set, and
//! commits exactly one new generation.

mod error;
mod indexer;
mod manifest;
mod scan;

pub use error::IndexerError;
pub use indexer::{Indexer, ReconcileReport};
pub use manifest::{Manifest, ManifestEntry};
pub use scan::{document_id, PendingChanges, ScanOptions};
