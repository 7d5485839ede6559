//! Component wiring from configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info, warn};

use recall_config::Config;
use recall_guard::{FileSnapshotStore, GuardOptions, SnapshotGuard};
use recall_hybrid::{
    FusionEngine, QueryCache, QueryCacheConfig, QueryLog, Retriever, SemanticLayer,
};
use recall_indexer::{Indexer, ScanOptions};
use recall_lexical::{load_index, LexicalError, LexicalIndex};
use recall_protocols::vector::{EmbeddingProvider, EmbeddingSink};
use recall_vector::{IndexingSink, InMemoryVectorIndex, OllamaEmbedding, OllamaEmbeddingConfig};

/// Files kept under the state directory.
#[derive(Debug, Clone)]
pub(crate) struct StatePaths {
    pub dir: PathBuf,
    pub lexical: PathBuf,
    pub manifest: PathBuf,
    pub cache: PathBuf,
    pub history: PathBuf,
    pub vectors: PathBuf,
    pub guard: PathBuf,
}

impl StatePaths {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            lexical: dir.join("lexical.json"),
            manifest: dir.join("manifest.json"),
            cache: dir.join("cache.json"),
            history: dir.join("history.json"),
            vectors: dir.join("vectors.json"),
            guard: dir.join("guard-state.json"),
            dir,
        }
    }

    pub fn logs(&self) -> PathBuf {
        self.dir.join("logs")
    }
}

/// Retrieval side of the application: index, indexer, retriever and cache.
pub(crate) struct App {
    pub config: Config,
    pub paths: StatePaths,
    pub indexer: Indexer,
    pub retriever: Retriever,
}

impl App {
    pub async fn load(config: Config) -> anyhow::Result<Self> {
        let paths = StatePaths::new(config.workspace.state_path());
        tokio::fs::create_dir_all(&paths.dir)
            .await
            .with_context(|| format!("creating state directory {}", paths.dir.display()))?;

        let lexical = Arc::new(load_lexical(&paths.lexical).await?);

        let options = ScanOptions {
            extensions: config.indexer.extensions.clone(),
            max_depth: config.indexer.max_depth,
        };
        let mut indexer = Indexer::open(Arc::clone(&lexical), options, &paths.manifest)
            .await?
            .with_index_path(&paths.lexical);

        let cache = if config.cache.enabled {
            let cache = load_cache(&paths.cache, cache_config(&config)).await;
            // Entries stamped by a lost index must never match a reissued generation.
            if let Some(stamped) = cache.max_generation() {
                let live = lexical.snapshot();
                if stamped > live.generation() || !live.is_available() {
                    lexical.advance_past(stamped);
                }
            }
            Some(Arc::new(cache))
        } else {
            None
        };

        let mut engine = FusionEngine::new(Arc::clone(&lexical))
            .with_vector_timeout(Duration::from_millis(config.search.vector_timeout_ms));

        if config.embedding.is_enabled() {
            let provider = build_provider(&config)?;
            let vectors = Arc::new(
                InMemoryVectorIndex::load(&paths.vectors, provider.dimension())
                    .await
                    .with_context(|| format!("loading {}", paths.vectors.display()))?,
            );
            engine = engine.with_semantic(SemanticLayer::new(
                Arc::clone(&provider),
                Arc::clone(&vectors) as _,
            ));

            if config.indexer.embed_on_change {
                let sink: Arc<dyn EmbeddingSink> = Arc::new(
                    IndexingSink::new(provider, vectors, config.embedding.max_chars)
                        .with_persist_path(&paths.vectors),
                );
                indexer = indexer.with_sink(sink);
            }
        } else {
            debug!("Embedding provider disabled, searching lexical only");
        }

        let mut retriever = Retriever::new(engine);
        if let Some(cache) = cache {
            retriever = retriever.with_cache(cache);
        }
        if config.history.enabled {
            let history = load_history(&paths.history, config.history.max_records).await;
            retriever = retriever.with_history(Arc::new(history));
        }

        Ok(Self {
            config,
            paths,
            indexer,
            retriever,
        })
    }

    pub fn source_dir(&self) -> PathBuf {
        self.config.workspace.source_path()
    }

    pub async fn save_cache(&self) -> anyhow::Result<()> {
        if let Some(cache) = self.retriever.cache() {
            cache
                .save(&self.paths.cache)
                .await
                .with_context(|| format!("saving {}", self.paths.cache.display()))?;
        }
        Ok(())
    }

    pub async fn save_history(&self) -> anyhow::Result<()> {
        if let Some(history) = self.retriever.history() {
            history
                .save(&self.paths.history)
                .await
                .with_context(|| format!("saving {}", self.paths.history.display()))?;
        }
        Ok(())
    }
}

/// A corrupt index file is rebuilt by the next reconcile instead of failing
/// every command. The manifest and cache generation floors keep the restarted
/// index from reissuing old generations.
async fn load_lexical(path: &Path) -> anyhow::Result<LexicalIndex> {
    match load_index(path).await {
        Ok(index) => Ok(index),
        Err(LexicalError::Corrupt(reason)) => {
            warn!(path = %path.display(), %reason, "Lexical index unreadable, starting empty; run `recall reconcile`");
            Ok(LexicalIndex::new())
        }
        Err(e) => Err(e).with_context(|| format!("loading {}", path.display())),
    }
}

fn build_provider(config: &Config) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "ollama" => {
            let ollama = OllamaEmbeddingConfig::default()
                .with_base_url(embedding.base_url.clone())
                .with_model(embedding.model.clone())
                .with_dimension(embedding.dimension)
                .with_timeout(Duration::from_millis(embedding.timeout_ms))
                .with_max_chars(embedding.max_chars);
            info!(model = %embedding.model, url = %embedding.base_url, "Using Ollama embeddings");
            Ok(Arc::new(OllamaEmbedding::new(ollama)?))
        }
        other => anyhow::bail!("unknown embedding provider: {}", other),
    }
}

pub(crate) fn cache_config(config: &Config) -> QueryCacheConfig {
    QueryCacheConfig {
        ttl: Duration::from_secs(config.cache.ttl_secs),
        max_entries: config.cache.max_entries,
        near_duplicate: config.cache.near_duplicate,
        similarity_threshold: config.cache.similarity_threshold,
        history_size: config.cache.history_size,
    }
}

/// A damaged cache file is not fatal: it only costs recomputation.
async fn load_cache(path: &Path, config: QueryCacheConfig) -> QueryCache {
    match QueryCache::load(path, config.clone()).await {
        Ok(cache) => cache,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Discarding unreadable query cache");
            QueryCache::new(config)
        }
    }
}

/// Query log history is best effort, like the cache.
async fn load_history(path: &Path, max_records: usize) -> QueryLog {
    match QueryLog::load(path, max_records).await {
        Ok(log) => log,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Discarding unreadable query history");
            QueryLog::new(max_records)
        }
    }
}

/// Snapshot guard over the configured protected files.
pub(crate) async fn open_guard(config: &Config) -> anyhow::Result<SnapshotGuard> {
    let paths = StatePaths::new(config.workspace.state_path());
    tokio::fs::create_dir_all(&paths.dir).await?;

    let guard = &config.guard;
    let backup_dir = guard.backup_path();
    let max_age = (guard.max_age_days > 0).then(|| chrono::Duration::days(i64::from(guard.max_age_days)));
    let options = GuardOptions::new(config.workspace.root_path(), guard.protected_files.clone())
        .with_cooldown(Duration::from_secs(guard.cooldown_secs))
        .with_retention(guard.max_snapshots, max_age)
        .with_quarantine_dir(backup_dir.join("quarantine"));

    let store = Arc::new(FileSnapshotStore::new(&backup_dir).await?);
    Ok(SnapshotGuard::open(options, store, &paths.guard).await?)
}
