use super::*;
use chrono::Utc;

fn doc(id: &str, content: &str) -> Document {
    Document::new(id, content, Utc::now())
}

#[test]
fn test_new_index_is_unavailable() {
    let index = LexicalIndex::new();
    let snapshot = index.snapshot();
    assert_eq!(snapshot.generation(), 0);
    assert!(!snapshot.is_available());
    assert_eq!(snapshot.doc_count(), 0);
}

#[test]
fn test_index_and_score() {
    let index = LexicalIndex::new();
    index.index(&doc("a", "quarterly revenue target one million"));
    index.index(&doc("b", "车市场 分析"));

    let scores = index.score("million target");
    assert!(scores["a"] > 0.0);
    assert!(!scores.contains_key("b"));
}

#[test]
fn test_term_frequencies_sum_to_length() {
    let entry = DocEntry::build("the cat and the hat", "h");
    assert_eq!(entry.length, 5);
    assert_eq!(entry.term_freqs["the"], 2);
    assert_eq!(entry.term_freqs.values().sum::<u32>(), entry.length);
}

#[test]
fn test_replace_supersedes_old_postings() {
    let index = LexicalIndex::new();
    index.index(&doc("a", "alpha beta"));
    index.index(&doc("a", "gamma"));

    let snapshot = index.snapshot();
    assert_eq!(snapshot.doc_count(), 1);
    assert_eq!(snapshot.doc_freq("alpha"), 0);
    assert_eq!(snapshot.doc_freq("beta"), 0);
    assert_eq!(snapshot.doc_freq("gamma"), 1);
    assert!(snapshot.postings("alpha").is_none());
    assert!((snapshot.avg_doc_len() - 1.0).abs() < f32::EPSILON);
}

#[test]
fn test_remove_deletes_postings() {
    let index = LexicalIndex::new();
    index.index(&doc("a", "shared unique"));
    index.index(&doc("b", "shared"));
    index.remove("a");

    let snapshot = index.snapshot();
    assert!(!snapshot.contains("a"));
    assert_eq!(snapshot.doc_freq("shared"), 1);
    assert_eq!(snapshot.term_count(), 1);
}

#[test]
fn test_empty_document_has_no_postings() {
    let index = LexicalIndex::new();
    index.index(&doc("empty", ""));
    index.index(&doc("punct", "!!! ---"));

    let snapshot = index.snapshot();
    assert!(snapshot.contains("empty"));
    assert_eq!(snapshot.document("punct").unwrap().length, 0);
    assert_eq!(snapshot.term_count(), 0);
    assert!(snapshot.score("anything").is_empty());
}

#[test]
fn test_commit_bumps_generation_once_per_batch() {
    let index = LexicalIndex::new();
    let mut writer = index.writer();
    writer.index(&doc("a", "one"));
    writer.index(&doc("b", "two"));
    writer.index(&doc("c", "three"));
    assert_eq!(writer.pending_changes(), 3);
    assert_eq!(writer.commit(), 1);
    assert_eq!(index.generation(), 1);
}

#[test]
fn test_empty_commit_still_bumps_generation() {
    let index = LexicalIndex::new();
    assert_eq!(index.writer().commit(), 1);
    assert!(index.snapshot().is_available());
}

#[test]
fn test_dropped_writer_discards_changes() {
    let index = LexicalIndex::new();
    {
        let mut writer = index.writer();
        writer.index(&doc("a", "draft"));
    }
    assert_eq!(index.generation(), 0);
    assert!(!index.snapshot().contains("a"));
}

#[test]
fn test_readers_keep_their_snapshot() {
    let index = LexicalIndex::new();
    index.index(&doc("a", "before"));
    let held = index.snapshot();

    let mut writer = index.writer();
    writer.index(&doc("b", "after"));
    writer.remove("a");
    // Uncommitted changes are invisible.
    assert!(index.snapshot().contains("a"));
    writer.commit();

    assert!(held.contains("a"));
    assert!(!held.contains("b"));
    assert_eq!(held.generation(), 1);

    let fresh = index.snapshot();
    assert!(!fresh.contains("a"));
    assert!(fresh.contains("b"));
    assert_eq!(fresh.generation(), 2);
}

#[test]
fn test_unchanged_documents_share_entries_across_commits() {
    let index = LexicalIndex::new();
    index.index(&doc("a", "stable content"));
    let before = Arc::clone(index.snapshot().document("a").unwrap());

    index.index(&doc("c", "new content"));
    let after = index.snapshot();
    assert!(Arc::ptr_eq(&before, after.document("a").unwrap()));
}

#[test]
fn test_reindex_same_hash_is_noop() {
    let index = LexicalIndex::new();
    index.index(&doc("a", "same"));
    let mut writer = index.writer();
    assert!(!writer.index(&doc("a", "same")));
    assert_eq!(writer.pending_changes(), 0);
}

#[test]
fn test_copy_on_write_does_not_touch_published_postings() {
    let index = LexicalIndex::new();
    index.index(&doc("a", "shared"));
    let held = index.snapshot();
    index.index(&doc("b", "shared"));

    assert_eq!(held.doc_freq("shared"), 1);
    assert_eq!(index.snapshot().doc_freq("shared"), 2);
}

#[test]
fn test_search_orders_by_score_then_id() {
    let index = LexicalIndex::new();
    let mut writer = index.writer();
    writer.index(&doc("b", "rust"));
    writer.index(&doc("a", "rust"));
    writer.index(&doc("c", "rust rust rust"));
    writer.index(&doc("d", "python"));
    writer.commit();

    let hits = index.snapshot().search("rust", 10);
    let ids: Vec<_> = hits.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["c", "a", "b"]);
}

#[test]
fn test_duplicate_query_terms_count_once() {
    let index = LexicalIndex::new();
    index.index(&doc("a", "rust"));
    let snapshot = index.snapshot();
    let terms = vec!["rust".to_string(), "rust".to_string()];
    let once = snapshot.score("rust")["a"];
    let twice = snapshot.score_terms(&terms, &Bm25::default())["a"];
    assert!((once - twice).abs() < f32::EPSILON);
}

#[test]
fn test_concurrent_readers_during_writes() {
    let index = Arc::new(LexicalIndex::new());
    index.index(&doc("seed", "common"));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let index = Arc::clone(&index);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let snapshot = index.snapshot();
                    // Every published snapshot is internally consistent.
                    let df = snapshot.doc_freq("common");
                    assert_eq!(df, snapshot.doc_count());
                }
            })
        })
        .collect();

    for i in 0..50 {
        index.index(&doc(&format!("d{i}"), "common"));
    }

    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(index.generation(), 51);
}

#[test]
fn test_advance_past_skips_issued_generations() {
    let index = LexicalIndex::new();
    assert_eq!(index.advance_past(7), 8);
    let snapshot = index.snapshot();
    assert_eq!(snapshot.generation(), 8);
    // Nothing has been committed into this index yet.
    assert!(!snapshot.is_available());

    assert_eq!(index.index(&doc("a", "fresh content")), 9);
    assert!(index.snapshot().is_available());
}

#[test]
fn test_advance_past_keeps_newer_generation() {
    let index = LexicalIndex::new();
    index.index(&doc("a", "one"));
    index.index(&doc("b", "two"));
    assert_eq!(index.advance_past(1), 2);
    assert_eq!(index.generation(), 2);
}

#[test]
fn test_writer_retain_drops_unkept_documents() {
    let index = LexicalIndex::new();
    let mut writer = index.writer();
    writer.index(&doc("keep.md", "alpha"));
    writer.index(&doc("drop.md", "beta"));
    writer.commit();

    let mut writer = index.writer();
    assert_eq!(writer.retain(|id| id == "keep.md"), 1);
    writer.commit();

    let snapshot = index.snapshot();
    assert!(snapshot.contains("keep.md"));
    assert!(!snapshot.contains("drop.md"));
    assert_eq!(snapshot.doc_freq("beta"), 0);
}
