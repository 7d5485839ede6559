use super::*;
use recall_protocols::ScoredResult;
use tempfile::TempDir;

fn response(ids: &[&str], source: ResultSource) -> QueryResponse {
    let results = ids
        .iter()
        .enumerate()
        .map(|(i, id)| ScoredResult {
            document_id: id.to_string(),
            passage_id: id.to_string(),
            lexical_score: 1.0,
            vector_score: None,
            lexical_norm: 1.0,
            vector_norm: 0.0,
            fused_score: 1.0 - i as f32 * 0.1,
            rank: i + 1,
        })
        .collect();
    QueryResponse {
        results,
        source,
        generation: 3,
        degraded: None,
        record_id: None,
    }
}

fn computed(ids: &[&str]) -> QueryResponse {
    response(ids, ResultSource::Computed)
}

#[test]
fn test_record_keeps_top_results_only() {
    let log = QueryLog::new(10);
    let ids = ["a", "b", "c", "d", "e", "f", "g"];
    let id = log.record("  revenue target ", &computed(&ids), Duration::from_millis(12));

    let record = log.get(&id).unwrap();
    assert_eq!(record.query, "revenue target");
    assert_eq!(record.result_count, 7);
    assert_eq!(record.top_results.len(), RECORDED_RESULTS);
    assert_eq!(record.top_results[0].document_id, "a");
    assert_eq!(record.duration_ms, 12);
    assert_eq!(record.source, "computed");
    assert_eq!(record.generation, 3);
    assert!(record.feedback.is_none());
}

#[test]
fn test_record_source_labels() {
    let log = QueryLog::new(10);
    let cached = log.record("q", &response(&["a"], ResultSource::Cached), Duration::ZERO);
    let similar = log.record(
        "q2",
        &response(
            &["a"],
            ResultSource::Approximate {
                similarity: 0.9,
                matched_query: "q".to_string(),
            },
        ),
        Duration::ZERO,
    );
    assert_eq!(log.get(&cached).unwrap().source, "cached");
    assert_eq!(log.get(&similar).unwrap().source, "approximate");
}

#[test]
fn test_oldest_records_are_dropped() {
    let log = QueryLog::new(2);
    let first = log.record("one", &computed(&["a"]), Duration::ZERO);
    log.record("two", &computed(&["a"]), Duration::ZERO);
    log.record("three", &computed(&["a"]), Duration::ZERO);

    assert_eq!(log.len(), 2);
    assert!(matches!(log.get(&first), Err(HistoryError::UnknownRecord(_))));
    let recent: Vec<_> = log.recent(10).into_iter().map(|r| r.query).collect();
    assert_eq!(recent, vec!["three", "two"]);
    // Counts outlive the records themselves.
    assert_eq!(log.stats(10).total_queries, 3);
}

#[test]
fn test_rate_by_prefix_and_replace() {
    let log = QueryLog::new(10);
    let id = log.record("revenue", &computed(&["a"]), Duration::ZERO);

    let rated = log
        .rate(&id[..8], Rating::NotHelpful, Some("wrong quarter".to_string()))
        .unwrap();
    let feedback = rated.feedback.unwrap();
    assert_eq!(feedback.rating, Rating::NotHelpful);
    assert_eq!(feedback.comment.as_deref(), Some("wrong quarter"));

    // A second rating replaces the first in the tally.
    log.rate(&id, Rating::Helpful, Some("  ".to_string())).unwrap();
    let summary = log.feedback_summary();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.helpful, 1);
    assert_eq!(summary.not_helpful, 0);
    assert!((summary.helpful_rate() - 1.0).abs() < f64::EPSILON);
    assert!(log.get(&id).unwrap().feedback.unwrap().comment.is_none());
}

#[test]
fn test_rate_unknown_or_empty_id() {
    let log = QueryLog::new(10);
    log.record("revenue", &computed(&["a"]), Duration::ZERO);
    assert!(matches!(
        log.rate("not-an-id", Rating::Helpful, None),
        Err(HistoryError::UnknownRecord(_))
    ));
    assert!(matches!(
        log.rate("", Rating::Helpful, None),
        Err(HistoryError::UnknownRecord(_))
    ));
    assert_eq!(log.feedback_summary(), FeedbackSummary::default());
}

#[test]
fn test_ambiguous_prefix_is_rejected() {
    let log = QueryLog::new(300);
    let ids: Vec<String> = (0..200)
        .map(|i| log.record(&format!("q{i}"), &computed(&["a"]), Duration::ZERO))
        .collect();
    // 200 random v4 ids cannot all start with distinct hex digits.
    let shared = ids
        .iter()
        .find(|id| ids.iter().filter(|o| o[..1] == id[..1]).count() > 1)
        .unwrap();
    assert!(matches!(
        log.rate(&shared[..1], Rating::Partial, None),
        Err(HistoryError::AmbiguousRecord(_))
    ));
}

#[test]
fn test_top_queries_normalize_text() {
    let log = QueryLog::new(10);
    for q in ["Revenue Target", "revenue  target", "garden", "revenue target"] {
        log.record(q, &computed(&["a"]), Duration::ZERO);
    }
    let top = log.top_queries(5);
    assert_eq!(top[0], ("revenue target".to_string(), 3));
    assert_eq!(top[1], ("garden".to_string(), 1));
    assert_eq!(log.top_queries(1).len(), 1);
}

#[test]
fn test_rating_parse() {
    assert_eq!("helpful".parse::<Rating>().unwrap(), Rating::Helpful);
    assert_eq!("Not-Helpful".parse::<Rating>().unwrap(), Rating::NotHelpful);
    assert_eq!("partial".parse::<Rating>().unwrap(), Rating::Partial);
    assert!("great".parse::<Rating>().is_err());
    assert_eq!(Rating::NotHelpful.to_string(), "not_helpful");
}

#[tokio::test]
async fn test_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.json");

    let log = QueryLog::new(10);
    let id = log.record("revenue", &computed(&["a", "b"]), Duration::from_millis(5));
    log.record("garden", &computed(&[]), Duration::ZERO);
    log.rate(&id, Rating::Partial, None).unwrap();
    log.save(&path).await.unwrap();

    let loaded = QueryLog::load(&path, 10).await.unwrap();
    assert_eq!(loaded.recent(10), log.recent(10));
    assert_eq!(loaded.feedback_summary().partial, 1);
    assert_eq!(loaded.stats(5).total_queries, 2);

    // A smaller capacity keeps the newest records.
    let trimmed = QueryLog::load(&path, 1).await.unwrap();
    assert_eq!(trimmed.recent(10)[0].query, "garden");
    assert_eq!(trimmed.len(), 1);
}

#[tokio::test]
async fn test_load_missing_and_corrupt() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.json");
    assert!(QueryLog::load(&path, 10).await.unwrap().is_empty());

    std::fs::write(&path, "{ broken").unwrap();
    assert!(matches!(
        QueryLog::load(&path, 10).await,
        Err(HistoryError::Corrupt(_))
    ));
}
