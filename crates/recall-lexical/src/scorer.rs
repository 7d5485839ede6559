//! BM25 scoring.
//!
//! score(D, Q) = Σ IDF(t) · tf·(k1 + 1) / (tf + k1·(1 − b + b·|D|/avgdl))
//!
//! with IDF(t) = ln((N − df + 0.5) / (df + 0.5) + 1), which stays positive
//! for every term that occurs in the corpus.

/// BM25 parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25 {
    /// Term frequency saturation.
    pub k1: f32,
    /// Document length normalization.
    pub b: f32,
}

impl Default for Bm25 {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

impl Bm25 {
    pub fn new(k1: f32, b: f32) -> Self {
        Self { k1, b }
    }

    pub fn idf(&self, total_docs: usize, doc_freq: usize) -> f32 {
        let n = total_docs as f32;
        let df = doc_freq as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Contribution of one term to one document.
    pub fn term_score(&self, idf: f32, tf: u32, doc_len: u32, avg_doc_len: f32) -> f32 {
        let tf = tf as f32;
        let avg = avg_doc_len.max(1.0);
        let norm = 1.0 - self.b + self.b * doc_len as f32 / avg;
        idf * (tf * (self.k1 + 1.0)) / (tf + self.k1 * norm)
    }
}
