//! Recall - hybrid retrieval over a personal knowledge base.
//!
//! Main entry point for the recall CLI.

use std::path::Path;

use clap::Parser;
use tracing::{debug, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use recall_config::{ConfigLoader, ConfigValidator};

mod app;
mod cli;
mod cmd_guard;
mod cmd_history;
mod cmd_query;

use app::{App, StatePaths};
use cli::{Cli, Commands};
use cmd_query::QueryArgs;

/// Console output goes to stderr so command output on stdout stays parseable.
fn init_tracing(log_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("recall")
        .filename_suffix("log")
        .max_log_files(14)
        .build(log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the worker alive for the program duration.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_ansi(true)
                .with_writer(std::io::stderr),
        )
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load_or_default(cli.config.as_deref())?;
    let paths = StatePaths::new(config.workspace.state_path());
    if let Err(e) = init_tracing(&paths.logs()) {
        eprintln!("Failed to initialise file logging: {}", e);
    }

    for warning in ConfigValidator::validate(&config)?.into_result()? {
        warn!(path = %warning.path, "{}", warning.message);
    }
    debug!(root = %config.workspace.root_path().display(), "Loaded configuration");

    match cli.command {
        Commands::Query {
            text,
            top_k,
            lexical_weight,
            vector_weight,
            no_cache,
            approximate,
            json,
        } => {
            let app = App::load(config).await?;
            let args = QueryArgs {
                text,
                top_k,
                lexical_weight,
                vector_weight,
                no_cache,
                approximate,
                json,
            };
            cmd_query::run_query(&app, args).await
        }
        Commands::Status { json } => {
            let app = App::load(config).await?;
            cmd_query::run_status(&app, json).await
        }
        Commands::Reconcile { full, json } => {
            let app = App::load(config).await?;
            cmd_query::run_reconcile(&app, full, json).await
        }
        Commands::History { limit, stats, json } => {
            let app = App::load(config).await?;
            cmd_history::run_history(&app, limit, stats, json).await
        }
        Commands::Feedback { id, rating, comment } => {
            let app = App::load(config).await?;
            cmd_history::run_feedback(&app, &id, rating, comment).await
        }
        Commands::Cache { action } => {
            let app = App::load(config).await?;
            cmd_query::run_cache(&app, action).await
        }
        Commands::Guard { action } => {
            let guard = app::open_guard(&config).await?;
            cmd_guard::handle_guard_command(&guard, action).await
        }
    }
}
