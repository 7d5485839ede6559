use super::*;
use tempfile::TempDir;

fn result(id: &str, score: f32) -> ScoredResult {
    ScoredResult {
        document_id: id.to_string(),
        passage_id: id.to_string(),
        lexical_score: score,
        vector_score: None,
        lexical_norm: 1.0,
        vector_norm: 0.0,
        fused_score: score,
        rank: 1,
    }
}

fn cache() -> QueryCache {
    QueryCache::new(QueryCacheConfig::default())
}

fn w() -> SearchWeights {
    SearchWeights::default()
}

#[test]
fn test_normalize_query() {
    assert_eq!(normalize_query("  Revenue\tTarget\n "), "revenue target");
}

#[test]
fn test_fingerprint_ignores_case_and_spacing() {
    assert_eq!(
        fingerprint("Revenue  Target", w(), 5),
        fingerprint("revenue target", w(), 5)
    );
}

#[test]
fn test_fingerprint_uses_effective_weights() {
    assert_eq!(
        fingerprint("q", SearchWeights::new(0.3, 0.7), 5),
        fingerprint("q", SearchWeights::new(0.15, 0.35), 5)
    );
    assert_ne!(
        fingerprint("q", SearchWeights::new(0.3, 0.7), 5),
        fingerprint("q", SearchWeights::new(0.7, 0.3), 5)
    );
    assert_ne!(fingerprint("q", w(), 5), fingerprint("q", w(), 6));
}

#[test]
fn test_token_similarity() {
    let a = vec!["a".to_string(), "b".to_string()];
    let b = vec!["b".to_string(), "c".to_string()];
    assert!((token_similarity(&a, &b) - 1.0 / 3.0).abs() < 1e-6);
    assert_eq!(token_similarity(&[], &[]), 0.0);
}

#[test]
fn test_exact_hit() {
    let cache = cache();
    cache.insert("revenue", w(), 5, 1, vec![result("a", 1.0)]);

    match cache.lookup("Revenue", w(), 5, 1) {
        CacheLookup::Exact(results) => assert_eq!(results[0].document_id, "a"),
        other => panic!("expected exact hit, got {:?}", other),
    }
    assert_eq!(cache.stats().hits, 1);
}

#[test]
fn test_miss_on_absent() {
    let cache = cache();
    assert_eq!(cache.lookup("nothing", w(), 5, 1), CacheLookup::Miss);
    assert_eq!(cache.stats().misses, 1);
}

#[test]
fn test_stale_generation_is_never_served() {
    let cache = cache();
    cache.insert("revenue", w(), 5, 1, vec![result("a", 1.0)]);

    assert_eq!(cache.lookup("revenue", w(), 5, 2), CacheLookup::Miss);
    // Lazily removed.
    assert!(cache.is_empty());
    // Even once the caller goes back to an old generation number, nothing
    // written under it survives.
    assert_eq!(cache.lookup("revenue", w(), 5, 1), CacheLookup::Miss);
}

#[test]
fn test_expired_entry_is_miss() {
    let cache = QueryCache::new(QueryCacheConfig {
        ttl: Duration::ZERO,
        ..QueryCacheConfig::default()
    });
    cache.insert("revenue", w(), 5, 1, vec![result("a", 1.0)]);
    assert_eq!(cache.lookup("revenue", w(), 5, 1), CacheLookup::Miss);
}

#[test]
fn test_different_weights_do_not_share_entries() {
    let cache = cache();
    cache.insert("revenue", SearchWeights::lexical_only(), 5, 1, vec![result("a", 1.0)]);
    assert_eq!(cache.lookup("revenue", w(), 5, 1), CacheLookup::Miss);
}

#[test]
fn test_near_duplicate_hit() {
    let cache = cache();
    cache.insert("revenue target million", w(), 5, 1, vec![result("a", 1.0)]);

    match cache.lookup("million target revenue", w(), 5, 1) {
        CacheLookup::Approximate {
            results,
            similarity,
            matched_query,
        } => {
            assert_eq!(results[0].document_id, "a");
            assert!((similarity - 1.0).abs() < 1e-6);
            assert_eq!(matched_query, "revenue target million");
        }
        other => panic!("expected approximate hit, got {:?}", other),
    }
    let stats = cache.stats();
    assert_eq!(stats.approximate_hits, 1);
    assert_eq!(stats.hits, 0);
}

#[test]
fn test_lookup_exact_skips_near_duplicates() {
    let cache = cache();
    cache.insert("revenue target million", w(), 5, 1, vec![result("a", 1.0)]);
    assert_eq!(
        cache.lookup_exact("million target revenue", w(), 5, 1),
        CacheLookup::Miss
    );
    assert_eq!(cache.stats().approximate_hits, 0);
}

#[test]
fn test_near_duplicate_below_threshold() {
    let cache = cache();
    cache.insert("revenue target million", w(), 5, 1, vec![result("a", 1.0)]);
    // 2 of 4 tokens shared = 0.5 < 0.8
    assert_eq!(cache.lookup("revenue target growth", w(), 5, 1), CacheLookup::Miss);
}

#[test]
fn test_near_duplicate_requires_same_weights() {
    let cache = cache();
    cache.insert("a b c d e", SearchWeights::lexical_only(), 5, 1, vec![result("a", 1.0)]);
    assert_eq!(cache.lookup("e d c b a", w(), 5, 1), CacheLookup::Miss);
}

#[test]
fn test_near_duplicate_ignores_stale_entries() {
    let cache = cache();
    cache.insert("revenue target million", w(), 5, 1, vec![result("a", 1.0)]);
    assert_eq!(cache.lookup("million target revenue", w(), 5, 2), CacheLookup::Miss);
}

#[test]
fn test_near_duplicate_disabled() {
    let cache = QueryCache::new(QueryCacheConfig {
        near_duplicate: false,
        ..QueryCacheConfig::default()
    });
    cache.insert("revenue target million", w(), 5, 1, vec![result("a", 1.0)]);
    assert_eq!(cache.lookup("million target revenue", w(), 5, 1), CacheLookup::Miss);
}

#[test]
fn test_insert_bounds_entries_oldest_first() {
    let cache = QueryCache::new(QueryCacheConfig {
        max_entries: 2,
        ..QueryCacheConfig::default()
    });
    cache.insert("first", w(), 5, 1, vec![]);
    std::thread::sleep(Duration::from_millis(5));
    cache.insert("second", w(), 5, 1, vec![]);
    std::thread::sleep(Duration::from_millis(5));
    cache.insert("third", w(), 5, 1, vec![]);

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.lookup("first", w(), 5, 1), CacheLookup::Miss);
    assert!(matches!(cache.lookup("third", w(), 5, 1), CacheLookup::Exact(_)));
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn test_sweep_removes_stale_and_expired() {
    let cache = cache();
    cache.insert("old", w(), 5, 1, vec![]);
    cache.insert("current", w(), 5, 2, vec![]);

    let report = cache.sweep(2);
    assert_eq!(report.stale, 1);
    assert_eq!(report.expired, 0);
    assert_eq!(cache.len(), 1);
    assert!(cache.suggestions("old", 5).is_empty());
}

#[test]
fn test_invalidate_all_weightings() {
    let cache = cache();
    cache.insert("revenue", w(), 5, 1, vec![]);
    cache.insert("revenue", SearchWeights::lexical_only(), 5, 1, vec![]);
    cache.insert("other", w(), 5, 1, vec![]);

    assert_eq!(cache.invalidate("  REVENUE "), 2);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_clear() {
    let cache = cache();
    cache.insert("revenue", w(), 5, 1, vec![]);
    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.stats().inserts, 1);
}

#[test]
fn test_stats_hit_rate() {
    let cache = cache();
    cache.insert("q", w(), 5, 1, vec![]);
    cache.lookup("q", w(), 5, 1);
    cache.lookup("q", w(), 5, 1);
    cache.lookup("zzz", w(), 5, 1);

    let stats = cache.stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
    assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.max_entries, 100);
    assert_eq!(stats.ttl_secs, 86_400);
    assert_eq!(CacheStats::default().hit_rate(), 0.0);
}

#[test]
fn test_popular_queries() {
    let cache = cache();
    cache.insert("alpha", w(), 5, 1, vec![]);
    cache.insert("beta", w(), 5, 1, vec![]);
    cache.insert("gamma", w(), 5, 1, vec![]);
    for _ in 0..3 {
        cache.lookup("beta", w(), 5, 1);
    }
    cache.lookup("alpha", w(), 5, 1);

    assert_eq!(
        cache.popular(10),
        vec![("beta".to_string(), 3), ("alpha".to_string(), 1)]
    );
}

#[test]
fn test_suggestions() {
    let cache = cache();
    cache.insert("revenue target", w(), 5, 1, vec![]);
    cache.insert("revenue forecast 2024", w(), 5, 1, vec![]);
    cache.insert("weather", w(), 5, 1, vec![]);

    let suggestions = cache.suggestions("revenue target q3", 5);
    let queries: Vec<_> = suggestions.iter().map(|(q, _)| q.as_str()).collect();
    assert_eq!(queries, vec!["revenue target", "revenue forecast 2024"]);
}

#[test]
fn test_history_is_bounded() {
    let cache = QueryCache::new(QueryCacheConfig {
        history_size: 2,
        ..QueryCacheConfig::default()
    });
    cache.insert("shared one", w(), 5, 1, vec![]);
    cache.insert("shared two", w(), 5, 1, vec![]);
    cache.insert("shared three", w(), 5, 1, vec![]);
    assert_eq!(cache.suggestions("shared", 10).len(), 2);
}

#[tokio::test]
async fn test_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");

    let cache = cache();
    cache.insert("revenue", w(), 5, 3, vec![result("a", 1.0)]);
    cache.lookup("revenue", w(), 5, 3);
    cache.save(&path).await.unwrap();

    let loaded = QueryCache::load(&path, QueryCacheConfig::default()).await.unwrap();
    assert_eq!(loaded.stats().hits, 1);
    assert!(matches!(loaded.lookup("revenue", w(), 5, 3), CacheLookup::Exact(_)));
    assert_eq!(loaded.lookup("revenue", w(), 5, 4), CacheLookup::Miss);
}

#[tokio::test]
async fn test_load_missing_is_empty() {
    let dir = TempDir::new().unwrap();
    let loaded = QueryCache::load(&dir.path().join("none.json"), QueryCacheConfig::default())
        .await
        .unwrap();
    assert!(loaded.is_empty());
}

#[test]
fn test_concurrent_lookups_and_inserts() {
    let cache = std::sync::Arc::new(cache());
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let cache = std::sync::Arc::clone(&cache);
            std::thread::spawn(move || {
                for i in 0..50 {
                    let q = format!("query {t} {i}");
                    cache.insert(&q, w(), 5, 1, vec![]);
                    assert!(matches!(
                        cache.lookup(&q, w(), 5, 1),
                        CacheLookup::Exact(_) | CacheLookup::Miss | CacheLookup::Approximate { .. }
                    ));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    cache.sweep(1);
    assert!(cache.len() <= 100);
    assert_eq!(cache.stats().inserts, 400);
}

#[test]
fn test_max_generation() {
    let cache = cache();
    assert_eq!(cache.max_generation(), None);
    cache.insert("revenue", w(), 5, 3, vec![result("a", 1.0)]);
    cache.insert("target", w(), 5, 7, vec![result("b", 1.0)]);
    assert_eq!(cache.max_generation(), Some(7));
}
