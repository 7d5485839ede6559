//! # Recall Lexical
//!
//! Keyword index for the recall retrieval engine.
//!
//! ## Features
//!
//! - Unicode-aware tokenizer (CJK characters are single-character terms)
//! - Copy-on-commit inverted index: readers hold an immutable
//!   [`IndexSnapshot`], a single [`IndexWriter`] builds the next one and
//!   publishes it atomically
//! - BM25 scoring
//! - JSON persistence

mod error;
mod index;
mod persist;
mod scorer;
pub mod tokenizer;

pub use error::LexicalError;
pub use index::{DocEntry, IndexSnapshot, IndexWriter, LexicalIndex, PostingList};
pub use persist::{load_index, save_index, PersistedDocument, PersistedIndex};
pub use scorer::Bm25;
pub use tokenizer::{tokenize, tokenize_unique};
