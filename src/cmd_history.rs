//! Query history and feedback commands.

use serde_json::json;

use recall_hybrid::{QueryLog, QueryRecord, Rating};

use crate::app::App;
use crate::cmd_query::short_id;

const TOP_QUERIES: usize = 10;

fn history(app: &App) -> anyhow::Result<&QueryLog> {
    match app.retriever.history() {
        Some(history) => Ok(history.as_ref()),
        None => anyhow::bail!("query history is disabled in configuration"),
    }
}

pub(crate) async fn run_history(app: &App, limit: usize, stats: bool, json: bool) -> anyhow::Result<()> {
    let history = history(app)?;

    if stats {
        let stats = history.stats(TOP_QUERIES);
        if json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
            return Ok(());
        }
        println!("Queries:  {} total, {} kept", stats.total_queries, stats.records);
        let f = &stats.feedback;
        println!(
            "Feedback: {} rated ({} helpful, {} not helpful, {} partial), {:.1}% helpful",
            f.total,
            f.helpful,
            f.not_helpful,
            f.partial,
            f.helpful_rate() * 100.0
        );
        if !stats.top_queries.is_empty() {
            println!("Most frequent:");
            for (query, count) in &stats.top_queries {
                println!("{:>6}  {}", count, query);
            }
        }
        return Ok(());
    }

    let records = history.recent(limit);
    if json {
        println!("{}", serde_json::to_string_pretty(&json!({ "records": records }))?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No queries recorded.");
    }
    for record in &records {
        print_record(record);
    }
    Ok(())
}

fn print_record(record: &QueryRecord) {
    let rating = record
        .feedback
        .as_ref()
        .map(|f| f.rating.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{}  {}  {:<11} {:>3} results {:>5} ms  [{}]  {}",
        short_id(&record.id),
        record.at.format("%Y-%m-%d %H:%M:%S"),
        record.source,
        record.result_count,
        record.duration_ms,
        rating,
        record.query
    );
}

pub(crate) async fn run_feedback(
    app: &App,
    id: &str,
    rating: Rating,
    comment: Option<String>,
) -> anyhow::Result<()> {
    let history = history(app)?;
    let record = history.rate(id, rating, comment)?;
    app.save_history().await?;
    println!("Recorded {} for \"{}\" ({})", rating, record.query, short_id(&record.id));
    Ok(())
}
