//! Score normalization and blending.
//!
//! Each modality is min-max normalized over the candidates it returned for
//! this query only. A degenerate range (one candidate, or all scores equal)
//! normalizes every candidate to 1.0. Documents missing from one modality
//! get 0 for it.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use recall_protocols::{source_document_id, DocumentId, ScoredResult, SearchWeights, VectorHit};

/// Min-max normalize `scores` into `[0, 1]`.
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    let Some(min) = scores.iter().copied().reduce(f32::min) else {
        return Vec::new();
    };
    let max = scores.iter().copied().fold(min, f32::max);
    let range = max - min;
    if range <= f32::EPSILON {
        return vec![1.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / range).collect()
}

/// Normalize a keyed score set, returning a lookup by key.
fn normalize_map<'a, I>(scores: I) -> HashMap<&'a str, f32>
where
    I: IntoIterator<Item = (&'a str, f32)>,
{
    let (keys, values): (Vec<&str>, Vec<f32>) = scores.into_iter().unzip();
    keys.into_iter().zip(min_max_normalize(&values)).collect()
}

/// Fuse raw lexical scores (per document) and vector hits (per document or
/// passage) into at most `top_k` ranked results, one per document.
pub fn fuse(
    lexical: &HashMap<DocumentId, f32>,
    vector: &[VectorHit],
    weights: SearchWeights,
    top_k: usize,
) -> Vec<ScoredResult> {
    if top_k == 0 {
        return Vec::new();
    }
    let (w_lexical, w_vector) = weights.effective();

    // Repeated passage ids keep their best similarity.
    let mut best_hits: HashMap<&str, f32> = HashMap::new();
    for hit in vector {
        best_hits
            .entry(hit.id.as_str())
            .and_modify(|s| *s = s.max(hit.similarity))
            .or_insert(hit.similarity);
    }

    let lexical_norm = normalize_map(lexical.iter().map(|(id, s)| (id.as_str(), *s)));
    let vector_norm = normalize_map(best_hits.iter().map(|(id, s)| (*id, *s)));

    let mut candidates: Vec<ScoredResult> = Vec::with_capacity(best_hits.len() + lexical.len());
    let mut covered: HashSet<&str> = HashSet::new();

    for (&passage_id, &similarity) in &best_hits {
        let document_id = source_document_id(passage_id);
        covered.insert(document_id);
        let lexical_score = lexical.get(document_id).copied().unwrap_or(0.0);
        let l = lexical_norm.get(document_id).copied().unwrap_or(0.0);
        let v = vector_norm.get(passage_id).copied().unwrap_or(0.0);
        candidates.push(ScoredResult {
            document_id: document_id.to_string(),
            passage_id: passage_id.to_string(),
            lexical_score,
            vector_score: Some(similarity),
            lexical_norm: l,
            vector_norm: v,
            fused_score: w_lexical * l + w_vector * v,
            rank: 0,
        });
    }

    for (document_id, &score) in lexical {
        if covered.contains(document_id.as_str()) {
            continue;
        }
        let l = lexical_norm.get(document_id.as_str()).copied().unwrap_or(0.0);
        candidates.push(ScoredResult {
            document_id: document_id.clone(),
            passage_id: document_id.clone(),
            lexical_score: score,
            vector_score: None,
            lexical_norm: l,
            vector_norm: 0.0,
            fused_score: w_lexical * l,
            rank: 0,
        });
    }

    candidates.sort_by(compare_results);

    let mut seen: HashSet<String> = HashSet::new();
    let mut results: Vec<ScoredResult> = candidates
        .into_iter()
        .filter(|r| seen.insert(r.document_id.clone()))
        .take(top_k)
        .collect();

    for (i, r) in results.iter_mut().enumerate() {
        r.rank = i + 1;
    }
    results
}

/// Fused desc, raw lexical desc, document id asc, passage id asc.
pub fn compare_results(a: &ScoredResult, b: &ScoredResult) -> Ordering {
    b.fused_score
        .total_cmp(&a.fused_score)
        .then_with(|| b.lexical_score.total_cmp(&a.lexical_score))
        .then_with(|| a.document_id.cmp(&b.document_id))
        .then_with(|| a.passage_id.cmp(&b.passage_id))
}

#[cfg(test)]
#[path = "fusion_tests.rs"]
mod tests;
