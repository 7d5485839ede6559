//! Retrieval commands: query, status, reconcile and cache maintenance.

use anyhow::Context;
use serde_json::json;

use recall_hybrid::{QueryOptions, QueryResponse, ResultSource};
use recall_indexer::IndexerError;
use recall_protocols::search::SearchWeights;

use crate::app::App;
use crate::cli::CacheAction;

pub(crate) struct QueryArgs {
    pub text: String,
    pub top_k: Option<usize>,
    pub lexical_weight: Option<f32>,
    pub vector_weight: Option<f32>,
    pub no_cache: bool,
    pub approximate: bool,
    pub json: bool,
}

pub(crate) async fn run_query(app: &App, args: QueryArgs) -> anyhow::Result<()> {
    let search = &app.config.search;
    let weights = SearchWeights::new(
        args.lexical_weight.unwrap_or(search.lexical_weight),
        args.vector_weight.unwrap_or(search.vector_weight),
    );
    let mut options = QueryOptions::new(weights, args.top_k.unwrap_or(search.top_k))
        .accept_approximate(args.approximate);
    if args.no_cache {
        options = options.without_cache();
    }

    let response = app.retriever.query(&args.text, &options).await?;
    app.save_cache().await?;
    app.save_history().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
        if response.results.is_empty() {
            print_suggestions(app, &args.text);
        }
        if let Some(id) = &response.record_id {
            println!("Rate these results: recall feedback {} helpful|not_helpful|partial", short_id(id));
        }
    }
    Ok(())
}

fn print_suggestions(app: &App, text: &str) {
    let Some(cache) = app.retriever.cache() else {
        return;
    };
    let suggestions = cache.suggestions(text, 3);
    if !suggestions.is_empty() {
        println!("Recent similar queries:");
        for (query, _) in suggestions {
            println!("  {}", query);
        }
    }
}

fn print_response(response: &QueryResponse) {
    match &response.source {
        ResultSource::Computed => {}
        ResultSource::Cached => println!("(cached)"),
        ResultSource::Approximate {
            similarity,
            matched_query,
        } => println!("(cached for similar query \"{}\", similarity {:.2})", matched_query, similarity),
    }
    if let Some(reason) = &response.degraded {
        println!("(keyword results only: {})", reason);
    }

    if response.results.is_empty() {
        println!("No results.");
        return;
    }
    for r in &response.results {
        let vector = r
            .vector_score
            .map(|s| format!("{:.3}", s))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>3}. {:<40} score {:.3}  (keyword {:.3}, semantic {})",
            r.rank, r.passage_id, r.fused_score, r.lexical_score, vector
        );
    }
}

pub(crate) async fn run_status(app: &App, json: bool) -> anyhow::Result<()> {
    let status = app.retriever.status();
    let source_dir = app.source_dir();
    let pending = match app.indexer.scan(&source_dir).await {
        Ok(pending) => Some(pending),
        Err(IndexerError::SourceMissing(_)) => None,
        Err(e) => return Err(e.into()),
    };

    if json {
        let value = json!({
            "index": status,
            "source_dir": source_dir,
            "pending": pending,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Generation: {}", status.generation);
    println!("Documents:  {} ({} terms)", status.documents, status.terms);
    println!(
        "Semantic:   {}",
        status.vector_backend.as_deref().unwrap_or("disabled")
    );
    match &status.cache {
        Some(cache) => println!(
            "Cache:      {}/{} entries, hit rate {:.1}% ({} hits, {} similar, {} misses)",
            cache.entries,
            cache.max_entries,
            cache.hit_rate() * 100.0,
            cache.hits,
            cache.approximate_hits,
            cache.misses
        ),
        None => println!("Cache:      disabled"),
    }
    match pending {
        Some(p) if p.is_empty() => println!("Source:     {} (up to date)", source_dir.display()),
        Some(p) => println!(
            "Source:     {} ({} added, {} updated, {} removed pending)",
            source_dir.display(),
            p.added.len(),
            p.updated.len(),
            p.removed.len()
        ),
        None => println!("Source:     {} (missing)", source_dir.display()),
    }
    Ok(())
}

pub(crate) async fn run_reconcile(app: &App, full: bool, json: bool) -> anyhow::Result<()> {
    let source_dir = app.source_dir();
    let report = if full {
        app.indexer
            .rebuild(&source_dir)
            .await
            .with_context(|| format!("rebuilding index from {}", source_dir.display()))?
    } else {
        app.indexer
            .reconcile(&source_dir)
            .await
            .with_context(|| format!("reconciling {}", source_dir.display()))?
    };

    // Entries from older generations can never hit again.
    if let Some(cache) = app.retriever.cache() {
        cache.sweep(report.generation);
    }
    app.save_cache().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
        if report.embed_failures > 0 {
            println!("{} documents failed to embed", report.embed_failures);
        }
    }
    Ok(())
}

pub(crate) async fn run_cache(app: &App, action: CacheAction) -> anyhow::Result<()> {
    let Some(cache) = app.retriever.cache() else {
        anyhow::bail!("query cache is disabled in configuration");
    };

    match action {
        CacheAction::Stats => {
            let stats = cache.stats();
            println!("{}", serde_json::to_string_pretty(&stats)?);
            println!("hit rate: {:.1}%", stats.hit_rate() * 100.0);
        }
        CacheAction::Sweep => {
            let report = cache.sweep(app.indexer.index().generation());
            println!(
                "Removed {} expired, {} stale, {} over capacity",
                report.expired, report.stale, report.evicted
            );
        }
        CacheAction::Clear => {
            cache.clear();
            println!("Cache cleared");
        }
        CacheAction::Popular { limit } => {
            let popular = cache.popular(limit);
            if popular.is_empty() {
                println!("No cached queries.");
            }
            for (query, hits) in popular {
                println!("{:>6}  {}", hits, query);
            }
        }
        CacheAction::Invalidate { query } => {
            let removed = cache.invalidate(&query);
            println!("Removed {} entries", removed);
        }
    }

    app.save_cache().await
}

pub(crate) fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
