//! Error types shared across the retrieval engine.

mod embedding;
mod search;
mod vector;

pub use embedding::*;
pub use search::*;
pub use vector::*;
