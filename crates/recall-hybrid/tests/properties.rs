//! Ranking and cache properties exercised through the public API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use recall_hybrid::{
    FusionEngine, QueryCache, QueryCacheConfig, QueryOptions, ResultSource, Retriever,
    SemanticLayer, VectorStatus,
};
use recall_lexical::LexicalIndex;
use recall_protocols::{
    Document, Embedding, EmbeddingProvider, SearchWeights, VectorError, VectorHit,
    VectorIndexAdapter,
};
use recall_vector::{HashEmbedding, InMemoryVectorIndex};

const DIM: usize = 32;

const CORPUS: &[(&str, &str)] = &[
    ("alpha.md", "quarterly revenue target one million"),
    ("beta.md", "revenue forecast for the next quarter"),
    ("gamma.md", "team offsite planning and travel"),
    ("delta.md", "million dollar revenue milestone reached"),
    ("epsilon.md", "车市场 分析"),
];

struct NeverAdapter;

#[async_trait]
impl VectorIndexAdapter for NeverAdapter {
    async fn query(&self, _v: &Embedding, _k: usize) -> Result<Vec<VectorHit>, VectorError> {
        std::future::pending::<()>().await;
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "never"
    }
}

fn lexical() -> Arc<LexicalIndex> {
    let index = Arc::new(LexicalIndex::new());
    let mut writer = index.writer();
    for (id, text) in CORPUS {
        writer.index(&Document::new(*id, *text, Utc::now()));
    }
    writer.commit();
    index
}

/// Vector index holding every document split into two passages.
async fn passages() -> Arc<InMemoryVectorIndex> {
    let provider = HashEmbedding::new(DIM);
    let index = Arc::new(InMemoryVectorIndex::new(DIM));
    for (id, text) in CORPUS {
        let words: Vec<&str> = text.split_whitespace().collect();
        let mid = words.len().div_ceil(2);
        for (n, part) in [&words[..mid], &words[mid..]].iter().enumerate() {
            let embedding = provider.embed(&part.join(" ")).await.unwrap();
            index.insert(format!("{id}#{n}"), embedding).unwrap();
        }
    }
    index
}

async fn hybrid_engine() -> FusionEngine {
    FusionEngine::new(lexical()).with_semantic(SemanticLayer::new(
        Arc::new(HashEmbedding::new(DIM)),
        passages().await,
    ))
}

#[tokio::test]
async fn test_zero_vector_weight_matches_lexical_order() {
    let engine = hybrid_engine().await;
    let index = Arc::clone(engine.lexical());

    for query in ["revenue", "million target", "quarter revenue million", "planning"] {
        let expected: Vec<String> = index
            .snapshot()
            .search(query, 10)
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        for lexical_weight in [0.1, 0.5, 1.0] {
            let outcome = engine
                .search(query, SearchWeights::new(lexical_weight, 0.0), 10)
                .await
                .unwrap();
            assert_eq!(outcome.vector, VectorStatus::Skipped);
            let got: Vec<String> = outcome.results.into_iter().map(|r| r.document_id).collect();
            assert_eq!(got, expected, "query {query:?} weight {lexical_weight}");
        }
    }
}

#[tokio::test]
async fn test_passages_collapse_to_one_result_per_document() {
    let engine = hybrid_engine().await;
    let outcome = engine
        .search("revenue million quarter", SearchWeights::default(), 10)
        .await
        .unwrap();

    assert!(matches!(outcome.vector, VectorStatus::Used { .. }));
    let mut ids: Vec<&str> = outcome.results.iter().map(|r| r.document_id.as_str()).collect();
    let total = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), total);
    for (i, r) in outcome.results.iter().enumerate() {
        assert_eq!(r.rank, i + 1);
        assert!(r.passage_id.starts_with(&r.document_id));
    }
}

#[tokio::test]
async fn test_identical_queries_serialize_identically() {
    let engine = hybrid_engine().await;
    let weights = SearchWeights::new(0.4, 0.6);
    let first = engine.search("revenue target", weights, 5).await.unwrap();
    let first = serde_json::to_vec(&first.results).unwrap();
    for _ in 0..10 {
        let again = engine.search("revenue target", weights, 5).await.unwrap();
        assert_eq!(serde_json::to_vec(&again.results).unwrap(), first);
    }
}

#[tokio::test]
async fn test_cjk_document_has_no_lexical_overlap() {
    let engine = FusionEngine::new(lexical());
    let outcome = engine
        .search("million target", SearchWeights::new(1.0, 0.0), 10)
        .await
        .unwrap();
    assert_eq!(outcome.results[0].document_id, "alpha.md");
    assert!(outcome.results.iter().all(|r| r.document_id != "epsilon.md"));
}

#[tokio::test]
async fn test_timed_out_backend_still_returns_lexical_results() {
    let engine = FusionEngine::new(lexical())
        .with_semantic(SemanticLayer::new(
            Arc::new(HashEmbedding::new(DIM)),
            Arc::new(NeverAdapter),
        ))
        .with_vector_timeout(Duration::from_millis(50));

    let outcome = engine
        .search("revenue target", SearchWeights::new(0.3, 0.7), 5)
        .await
        .unwrap();
    assert!(outcome.vector.is_degraded());
    assert_eq!(outcome.results[0].document_id, "alpha.md");
    assert!(outcome.results.iter().all(|r| r.lexical_score > 0.0));
}

#[tokio::test]
async fn test_cached_entries_never_outlive_their_generation() {
    let index = lexical();
    let cache = Arc::new(QueryCache::new(QueryCacheConfig::default()));
    let retriever = Retriever::new(FusionEngine::new(Arc::clone(&index))).with_cache(cache);
    let opts = QueryOptions::new(SearchWeights::lexical_only(), 5).accept_approximate(true);

    for round in 0..5u64 {
        let first = retriever.query("revenue", &opts).await.unwrap();
        assert_eq!(first.source, ResultSource::Computed);
        assert_eq!(first.generation, round + 1);

        let second = retriever.query("revenue", &opts).await.unwrap();
        assert_eq!(second.source, ResultSource::Cached);
        assert_eq!(second.generation, round + 1);

        index.index(&Document::new(
            format!("extra-{round}.md"),
            "revenue update",
            Utc::now(),
        ));
    }
}

#[tokio::test]
async fn test_empty_index_without_vectors_is_an_error_not_an_empty_list() {
    let engine = FusionEngine::new(Arc::new(LexicalIndex::new()));
    assert!(engine
        .search("anything", SearchWeights::default(), 5)
        .await
        .is_err());

    let committed = Arc::new(LexicalIndex::new());
    committed.writer().commit();
    let outcome = FusionEngine::new(committed)
        .search("anything", SearchWeights::default(), 5)
        .await
        .unwrap();
    assert!(outcome.results.is_empty());
}
