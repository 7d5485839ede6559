//! Two-tier query cache.
//!
//! Exact tier: entries keyed by a fingerprint of the normalized query text,
//! the effective weights and `top_k`, stamped with the lexical index
//! generation they were computed from. An entry is served only while its
//! stamp equals the live generation and its TTL has not elapsed.
//!
//! Near-duplicate tier: a bounded history of recent queries, compared by
//! token-set overlap. A close enough prior query with the same weights and
//! `top_k` yields [`CacheLookup::Approximate`], which callers may refuse.
//!
//! Entries live in a sharded map, so lookups for different fingerprints do
//! not contend.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use recall_lexical::tokenize_unique;
use recall_protocols::persist::{read_json, write_json};
use recall_protocols::{ScoredResult, SearchWeights};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::CacheError;

/// Cache tuning.
#[derive(Debug, Clone)]
pub struct QueryCacheConfig {
    pub ttl: Duration,
    pub max_entries: usize,
    pub near_duplicate: bool,
    pub similarity_threshold: f32,
    pub history_size: usize,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
            max_entries: 100,
            near_duplicate: true,
            similarity_threshold: 0.8,
            history_size: 64,
        }
    }
}

/// One cached ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    /// Normalized query text.
    pub query: String,
    /// Effective weights, rounded, as used in the fingerprint.
    pub weights: String,
    pub top_k: usize,
    pub results: Vec<ScoredResult>,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
    /// Lexical index generation the results were computed from.
    pub generation: u64,
    pub hits: u64,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let ttl = i64::try_from(self.ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds);
        match ttl {
            Some(ttl) => now.signed_duration_since(self.created_at) >= ttl,
            None => false,
        }
    }

    pub fn is_valid(&self, generation: u64, now: DateTime<Utc>) -> bool {
        self.generation == generation && !self.is_expired(now)
    }
}

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Exact(Vec<ScoredResult>),
    Approximate {
        results: Vec<ScoredResult>,
        similarity: f32,
        matched_query: String,
    },
    Miss,
}

/// Counters since the cache was created or loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub approximate_hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub entries: usize,
    pub max_entries: usize,
    pub ttl_secs: u64,
}

impl CacheStats {
    /// Exact hits over all lookups.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.approximate_hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Outcome of a [`QueryCache::sweep`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub expired: usize,
    pub stale: usize,
    pub evicted: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistoryItem {
    fingerprint: String,
    query: String,
    weights: String,
    top_k: usize,
    tokens: Vec<String>,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    approximate_hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCache {
    saved_at: DateTime<Utc>,
    entries: Vec<CacheEntry>,
    history: Vec<HistoryItem>,
    stats: CacheStats,
}

/// Lowercase and collapse whitespace.
pub fn normalize_query(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn weights_key(weights: SearchWeights) -> String {
    let (l, v) = weights.effective();
    format!("{:.6}:{:.6}", l, v)
}

/// Hex SHA-256 of normalized text, effective weights and `top_k`.
pub fn fingerprint(text: &str, weights: SearchWeights, top_k: usize) -> String {
    fingerprint_parts(&normalize_query(text), &weights_key(weights), top_k)
}

fn fingerprint_parts(normalized: &str, weights: &str, top_k: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.update([0x1f]);
    hasher.update(weights.as_bytes());
    hasher.update([0x1f]);
    hasher.update(top_k.to_le_bytes());
    hex::encode(hasher.finalize())
}

/// Jaccard overlap of two token sets.
pub fn token_similarity(a: &[String], b: &[String]) -> f32 {
    let a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let b: HashSet<&str> = b.iter().map(String::as_str).collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f32 / union as f32
}

/// Concurrent query cache.
pub struct QueryCache {
    config: QueryCacheConfig,
    entries: DashMap<String, CacheEntry>,
    history: RwLock<VecDeque<HistoryItem>>,
    counters: Counters,
}

impl QueryCache {
    pub fn new(config: QueryCacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            history: RwLock::new(VecDeque::new()),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &QueryCacheConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest generation any cached entry is stamped with.
    pub fn max_generation(&self) -> Option<u64> {
        self.entries.iter().map(|e| e.generation).max()
    }

    /// Look `text` up for the given weights, `top_k` and live generation,
    /// consulting the near-duplicate tier if it is enabled.
    pub fn lookup(
        &self,
        text: &str,
        weights: SearchWeights,
        top_k: usize,
        generation: u64,
    ) -> CacheLookup {
        self.lookup_inner(text, weights, top_k, generation, self.config.near_duplicate)
    }

    /// Exact tier only.
    pub fn lookup_exact(
        &self,
        text: &str,
        weights: SearchWeights,
        top_k: usize,
        generation: u64,
    ) -> CacheLookup {
        self.lookup_inner(text, weights, top_k, generation, false)
    }

    fn lookup_inner(
        &self,
        text: &str,
        weights: SearchWeights,
        top_k: usize,
        generation: u64,
        near_duplicate: bool,
    ) -> CacheLookup {
        let normalized = normalize_query(text);
        let wkey = weights_key(weights);
        let fp = fingerprint_parts(&normalized, &wkey, top_k);
        let now = Utc::now();

        if let Some(mut entry) = self.entries.get_mut(&fp) {
            if entry.is_valid(generation, now) {
                entry.hits += 1;
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(query = %normalized, generation, "Cache hit");
                return CacheLookup::Exact(entry.results.clone());
            }
        }
        // Lazy removal; re-checked under the shard lock.
        if self
            .entries
            .remove_if(&fp, |_, e| !e.is_valid(generation, now))
            .is_some()
        {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(query = %normalized, "Dropped stale cache entry");
        }

        if near_duplicate {
            if let Some(found) = self.near_duplicate(&normalized, &fp, &wkey, top_k, generation, now)
            {
                self.counters.approximate_hits.fetch_add(1, Ordering::Relaxed);
                return found;
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!(query = %normalized, "Cache miss");
        CacheLookup::Miss
    }

    fn near_duplicate(
        &self,
        normalized: &str,
        fp: &str,
        wkey: &str,
        top_k: usize,
        generation: u64,
        now: DateTime<Utc>,
    ) -> Option<CacheLookup> {
        let tokens = tokenize_unique(normalized);
        if tokens.is_empty() {
            return None;
        }

        let mut candidates: Vec<(f32, usize, String)> = {
            let history = self.history.read();
            history
                .iter()
                .enumerate()
                .filter(|(_, h)| h.fingerprint != fp && h.weights == wkey && h.top_k == top_k)
                .map(|(pos, h)| (token_similarity(&tokens, &h.tokens), pos, h.fingerprint.clone()))
                .filter(|(sim, _, _)| *sim >= self.config.similarity_threshold)
                .collect()
        };
        // Most similar first, then most recent.
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

        for (similarity, _, candidate) in candidates {
            if let Some(entry) = self.entries.get(&candidate) {
                if entry.is_valid(generation, now) {
                    debug!(query = %normalized, matched = %entry.query, similarity, "Approximate cache hit");
                    return Some(CacheLookup::Approximate {
                        results: entry.results.clone(),
                        similarity,
                        matched_query: entry.query.clone(),
                    });
                }
            }
        }
        None
    }

    /// Store freshly computed results stamped with `generation`.
    pub fn insert(
        &self,
        text: &str,
        weights: SearchWeights,
        top_k: usize,
        generation: u64,
        results: Vec<ScoredResult>,
    ) {
        let normalized = normalize_query(text);
        let wkey = weights_key(weights);
        let fp = fingerprint_parts(&normalized, &wkey, top_k);

        let entry = CacheEntry {
            fingerprint: fp.clone(),
            query: normalized.clone(),
            weights: wkey.clone(),
            top_k,
            results,
            created_at: Utc::now(),
            ttl_secs: self.config.ttl.as_secs(),
            generation,
            hits: 0,
        };
        self.entries.insert(fp.clone(), entry);
        self.counters.inserts.fetch_add(1, Ordering::Relaxed);

        {
            let mut history = self.history.write();
            history.retain(|h| h.fingerprint != fp);
            history.push_back(HistoryItem {
                fingerprint: fp,
                tokens: tokenize_unique(&normalized),
                query: normalized,
                weights: wkey,
                top_k,
            });
            while history.len() > self.config.history_size {
                history.pop_front();
            }
        }

        self.evict_overflow();
    }

    /// Remove expired and stale entries, then evict oldest-first beyond
    /// `max_entries`.
    pub fn sweep(&self, generation: u64) -> SweepReport {
        let now = Utc::now();
        let mut report = SweepReport::default();
        self.entries.retain(|_, e| {
            if e.generation != generation {
                report.stale += 1;
                false
            } else if e.is_expired(now) {
                report.expired += 1;
                false
            } else {
                true
            }
        });
        report.evicted = self.evict_overflow();
        let removed = (report.stale + report.expired) as u64;
        self.counters.evictions.fetch_add(removed, Ordering::Relaxed);
        self.prune_history();
        info!(
            stale = report.stale,
            expired = report.expired,
            evicted = report.evicted,
            remaining = self.entries.len(),
            "Swept query cache"
        );
        report
    }

    /// Drop every entry for `text`, whatever its weights. Returns how many.
    pub fn invalidate(&self, text: &str) -> usize {
        let normalized = normalize_query(text);
        let before = self.entries.len();
        self.entries.retain(|_, e| e.query != normalized);
        self.history.write().retain(|h| h.query != normalized);
        before - self.entries.len()
    }

    /// Drop all entries and history. Counters are kept.
    pub fn clear(&self) {
        self.entries.clear();
        self.history.write().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            approximate_hits: self.counters.approximate_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            inserts: self.counters.inserts.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            entries: self.entries.len(),
            max_entries: self.config.max_entries,
            ttl_secs: self.config.ttl.as_secs(),
        }
    }

    /// Most frequently served queries, by hit count then text.
    pub fn popular(&self, limit: usize) -> Vec<(String, u64)> {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for e in self.entries.iter() {
            *counts.entry(e.query.clone()).or_insert(0) += e.hits;
        }
        let mut popular: Vec<_> = counts.into_iter().filter(|(_, h)| *h > 0).collect();
        popular.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        popular.truncate(limit);
        popular
    }

    /// Recent queries sharing tokens with `text`, most similar first.
    pub fn suggestions(&self, text: &str, limit: usize) -> Vec<(String, f32)> {
        let normalized = normalize_query(text);
        let tokens = tokenize_unique(&normalized);
        let history = self.history.read();

        let mut best: HashMap<&str, f32> = HashMap::new();
        for h in history.iter().filter(|h| h.query != normalized) {
            let sim = token_similarity(&tokens, &h.tokens);
            if sim > 0.0 {
                let slot = best.entry(h.query.as_str()).or_insert(0.0);
                *slot = slot.max(sim);
            }
        }
        let mut out: Vec<(String, f32)> =
            best.into_iter().map(|(q, s)| (q.to_string(), s)).collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out.truncate(limit);
        out
    }

    /// Write entries, history and counters to `path`.
    pub async fn save(&self, path: &Path) -> Result<(), CacheError> {
        let mut entries: Vec<CacheEntry> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let persisted = PersistedCache {
            saved_at: Utc::now(),
            entries,
            history: self.history.read().iter().cloned().collect(),
            stats: self.stats(),
        };
        write_json(path, &persisted).await?;
        debug!(path = %path.display(), entries = persisted.entries.len(), "Saved query cache");
        Ok(())
    }

    /// Load a cache saved by [`save`](Self::save); empty if `path` is absent.
    pub async fn load(path: &Path, config: QueryCacheConfig) -> Result<Self, CacheError> {
        let persisted: Option<PersistedCache> =
            read_json(path).await.map_err(|e| match e.kind() {
                io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                    CacheError::Corrupt(format!("{}: {}", path.display(), e))
                }
                _ => CacheError::Io(e),
            })?;

        let cache = Self::new(config);
        if let Some(p) = persisted {
            for entry in p.entries {
                cache.entries.insert(entry.fingerprint.clone(), entry);
            }
            {
                let mut history = cache.history.write();
                history.extend(p.history);
                while history.len() > cache.config.history_size {
                    history.pop_front();
                }
            }
            let c = &cache.counters;
            c.hits.store(p.stats.hits, Ordering::Relaxed);
            c.approximate_hits.store(p.stats.approximate_hits, Ordering::Relaxed);
            c.misses.store(p.stats.misses, Ordering::Relaxed);
            c.inserts.store(p.stats.inserts, Ordering::Relaxed);
            c.evictions.store(p.stats.evictions, Ordering::Relaxed);
            cache.evict_overflow();
        }
        Ok(cache)
    }

    /// Evict oldest entries until at most `max_entries` remain.
    fn evict_overflow(&self) -> usize {
        let excess = self.entries.len().saturating_sub(self.config.max_entries);
        if excess == 0 {
            return 0;
        }
        let mut by_age: Vec<(DateTime<Utc>, String)> = self
            .entries
            .iter()
            .map(|e| (e.created_at, e.key().clone()))
            .collect();
        by_age.sort();

        let mut evicted = 0;
        for (_, fp) in by_age.into_iter().take(excess) {
            if self.entries.remove(&fp).is_some() {
                evicted += 1;
            }
        }
        self.counters.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        evicted
    }

    fn prune_history(&self) {
        self.history
            .write()
            .retain(|h| self.entries.contains_key(&h.fingerprint));
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
