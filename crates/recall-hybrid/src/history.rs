//! Query log with user feedback.
//!
//! Every answered query is recorded with its top results, how long it took
//! and where the answer came from. A record can be rated afterwards by its
//! id or any unique prefix of it. Only the newest `max_records` records are
//! kept, while per-query counts and the feedback tally cover the whole
//! lifetime of the log file.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use recall_protocols::persist::{read_json, write_json};
use recall_protocols::DocumentId;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::normalize_query;
use crate::error::HistoryError;
use crate::retriever::{QueryResponse, ResultSource};

/// Results kept per record.
pub const RECORDED_RESULTS: usize = 5;

/// How useful a set of results was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Helpful,
    NotHelpful,
    Partial,
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rating::Helpful => write!(f, "helpful"),
            Rating::NotHelpful => write!(f, "not_helpful"),
            Rating::Partial => write!(f, "partial"),
        }
    }
}

impl FromStr for Rating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "helpful" | "yes" => Ok(Rating::Helpful),
            "not_helpful" | "unhelpful" | "no" => Ok(Rating::NotHelpful),
            "partial" => Ok(Rating::Partial),
            other => Err(format!(
                "unknown rating '{}', expected helpful, not_helpful or partial",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub rating: Rating,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedHit {
    pub document_id: DocumentId,
    pub score: f32,
}

/// One answered query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: String,
    pub query: String,
    pub at: DateTime<Utc>,
    /// `computed`, `cached` or `approximate`.
    pub source: String,
    pub generation: u64,
    pub duration_ms: u64,
    pub result_count: usize,
    pub top_results: Vec<RecordedHit>,
    #[serde(default)]
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
}

impl QueryRecord {
    /// First eight characters of the id, enough to address it in practice.
    pub fn short_id(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }
}

/// Lifetime feedback counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackSummary {
    pub total: u64,
    pub helpful: u64,
    pub not_helpful: u64,
    pub partial: u64,
}

impl FeedbackSummary {
    /// Share of ratings that were `helpful`; 0 with no ratings.
    pub fn helpful_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.helpful as f64 / self.total as f64
        }
    }

    fn count(&mut self, rating: Rating) -> &mut u64 {
        match rating {
            Rating::Helpful => &mut self.helpful,
            Rating::NotHelpful => &mut self.not_helpful,
            Rating::Partial => &mut self.partial,
        }
    }

    fn add(&mut self, rating: Rating) {
        self.total += 1;
        *self.count(rating) += 1;
    }

    fn retract(&mut self, rating: Rating) {
        self.total = self.total.saturating_sub(1);
        let count = self.count(rating);
        *count = count.saturating_sub(1);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryStats {
    pub total_queries: u64,
    pub records: usize,
    pub top_queries: Vec<(String, u64)>,
    pub feedback: FeedbackSummary,
}

#[derive(Debug, Default)]
struct LogState {
    records: VecDeque<QueryRecord>,
    query_counts: HashMap<String, u64>,
    total_queries: u64,
    feedback: FeedbackSummary,
}

#[derive(Serialize, Deserialize)]
struct PersistedLog {
    saved_at: DateTime<Utc>,
    records: Vec<QueryRecord>,
    #[serde(default)]
    query_counts: HashMap<String, u64>,
    #[serde(default)]
    total_queries: u64,
    #[serde(default)]
    feedback: FeedbackSummary,
}

/// Bounded log of answered queries.
pub struct QueryLog {
    max_records: usize,
    state: Mutex<LogState>,
}

impl QueryLog {
    pub fn new(max_records: usize) -> Self {
        Self {
            max_records: max_records.max(1),
            state: Mutex::new(LogState::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record `response` as the answer to `query`. Returns the record id.
    pub fn record(&self, query: &str, response: &QueryResponse, duration: Duration) -> String {
        let source = match response.source {
            ResultSource::Computed => "computed",
            ResultSource::Cached => "cached",
            ResultSource::Approximate { .. } => "approximate",
        };
        let record = QueryRecord {
            id: Uuid::new_v4().to_string(),
            query: query.trim().to_string(),
            at: Utc::now(),
            source: source.to_string(),
            generation: response.generation,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            result_count: response.results.len(),
            top_results: response
                .results
                .iter()
                .take(RECORDED_RESULTS)
                .map(|r| RecordedHit {
                    document_id: r.document_id.clone(),
                    score: r.fused_score,
                })
                .collect(),
            degraded: response.degraded.is_some(),
            feedback: None,
        };
        let id = record.id.clone();
        debug!(id = %record.short_id(), query = %record.query, "Recorded query");

        let mut state = self.state.lock();
        state.total_queries += 1;
        *state.query_counts.entry(normalize_query(query)).or_insert(0) += 1;
        state.records.push_back(record);
        while state.records.len() > self.max_records {
            state.records.pop_front();
        }
        id
    }

    /// The record whose id is or starts with `id`.
    pub fn get(&self, id: &str) -> Result<QueryRecord, HistoryError> {
        let state = self.state.lock();
        find(&state.records, id).map(|i| state.records[i].clone())
    }

    /// Rate the record addressed by `id`, replacing any earlier rating.
    pub fn rate(
        &self,
        id: &str,
        rating: Rating,
        comment: Option<String>,
    ) -> Result<QueryRecord, HistoryError> {
        let mut state = self.state.lock();
        let index = find(&state.records, id)?;
        let previous = state.records[index].feedback.as_ref().map(|f| f.rating);
        if let Some(previous) = previous {
            state.feedback.retract(previous);
        }
        state.feedback.add(rating);

        let record = &mut state.records[index];
        record.feedback = Some(Feedback {
            rating,
            comment: comment.filter(|c| !c.trim().is_empty()),
            at: Utc::now(),
        });
        info!(id = %record.short_id(), %rating, "Recorded feedback");
        Ok(record.clone())
    }

    /// Up to `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<QueryRecord> {
        self.state.lock().records.iter().rev().take(limit).cloned().collect()
    }

    /// Most frequent normalized queries, by count desc then text asc.
    pub fn top_queries(&self, limit: usize) -> Vec<(String, u64)> {
        let state = self.state.lock();
        let mut counts: Vec<(String, u64)> = state
            .query_counts
            .iter()
            .map(|(q, n)| (q.clone(), *n))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts.truncate(limit);
        counts
    }

    pub fn feedback_summary(&self) -> FeedbackSummary {
        self.state.lock().feedback
    }

    pub fn stats(&self, top: usize) -> HistoryStats {
        let top_queries = self.top_queries(top);
        let state = self.state.lock();
        HistoryStats {
            total_queries: state.total_queries,
            records: state.records.len(),
            top_queries,
            feedback: state.feedback,
        }
    }

    /// Write records, counts and the feedback tally to `path`.
    pub async fn save(&self, path: &Path) -> Result<(), HistoryError> {
        let persisted = {
            let state = self.state.lock();
            PersistedLog {
                saved_at: Utc::now(),
                records: state.records.iter().cloned().collect(),
                query_counts: state.query_counts.clone(),
                total_queries: state.total_queries,
                feedback: state.feedback,
            }
        };
        write_json(path, &persisted).await?;
        debug!(path = %path.display(), records = persisted.records.len(), "Saved query log");
        Ok(())
    }

    /// Load a log saved by [`save`](Self::save); empty if `path` is absent.
    pub async fn load(path: &Path, max_records: usize) -> Result<Self, HistoryError> {
        let persisted: Option<PersistedLog> =
            read_json(path).await.map_err(|e| match e.kind() {
                io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                    HistoryError::Corrupt(format!("{}: {}", path.display(), e))
                }
                _ => HistoryError::Io(e),
            })?;

        let log = Self::new(max_records);
        if let Some(p) = persisted {
            let mut state = log.state.lock();
            state.records = p.records.into();
            while state.records.len() > log.max_records {
                state.records.pop_front();
            }
            state.query_counts = p.query_counts;
            state.total_queries = p.total_queries;
            state.feedback = p.feedback;
        }
        Ok(log)
    }
}

fn find(records: &VecDeque<QueryRecord>, id: &str) -> Result<usize, HistoryError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(HistoryError::UnknownRecord(id.to_string()));
    }
    let mut matches = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.id.starts_with(id))
        .map(|(i, _)| i);
    match (matches.next(), matches.next()) {
        (Some(i), None) => Ok(i),
        (None, _) => Err(HistoryError::UnknownRecord(id.to_string())),
        (Some(_), Some(_)) => Err(HistoryError::AmbiguousRecord(id.to_string())),
    }
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
