//! Prospect Planner - clusters prospect locations into day routes
//!
//! Reads distributors, zones, prospects and agents from PostgreSQL, builds
//! size-bounded geographic clusters, assigns each to an agent and a date,
//! orders the stops and writes the route plan back (or to CSV in dry-run mode).

mod cli;
mod config;
mod db;
mod defaults;
mod error;
mod services;
mod types;

use std::sync::Arc;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command, PlanArgs};
use db::{PgStore, RouteStore};
use services::export::DryRunSink;
use services::pipeline::PipelineOrchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    // Logs directory - use LOGS_DIR env var or default to ./logs
    dotenvy::dotenv().ok();
    let logs_dir = std::env::var("LOGS_DIR").unwrap_or_else(|_| "logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &logs_dir, "prospect-planner.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Initialize logging - both stdout and file
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,prospect_planner=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer()) // stdout
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false)) // file
        .init();

    // Load configuration
    let mut config = config::Config::from_env()?;
    info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    info!("Connected to PostgreSQL");

    match command {
        Command::Migrate => {
            db::run_migrations(&pool).await?;
        }
        Command::Plan(args) => {
            args.apply(&mut config.planner);
            config.planner.validate()?;
            plan(pool, &config, &args).await?;
        }
    }

    Ok(())
}

async fn plan(pool: sqlx::PgPool, config: &config::Config, args: &PlanArgs) -> Result<()> {
    let store = Arc::new(PgStore::new(pool));

    let entities = if args.all {
        store.list_entity_names().await?
    } else {
        args.distributors.clone()
    };
    info!(
        "Planning {} distributors from {} ({} business days, clusters {}..={}, {} workers{})",
        entities.len(),
        args.start_date,
        config.planner.business_days,
        config.planner.min_cluster_size,
        config.planner.max_cluster_size,
        config.planner.max_workers,
        if args.dry_run { ", dry run" } else { "" }
    );

    let mut orchestrator = PipelineOrchestrator::new(store.clone(), store, config.planner.clone())
        .with_depot_override(args.depot_override());
    if let Some(seed) = args.seed {
        orchestrator = orchestrator.with_seed(seed);
    }
    if args.dry_run {
        orchestrator = orchestrator.with_dry_run(Arc::new(DryRunSink::new()), &config.export_dir);
    }

    let report = orchestrator.run_batch(&entities, args.start_date).await;

    let rows: u64 = report.summaries.iter().map(|s| s.rows_written).sum();
    info!(
        "Done: {} distributors planned, {} failed, {} rows written",
        report.summaries.len(),
        report.failures.len(),
        rows
    );
    for (entity, reason) in &report.failures {
        error!("  {}: {}", entity, reason);
    }

    if !report.failures.is_empty() && report.summaries.is_empty() {
        anyhow::bail!("planning failed for every distributor");
    }
    Ok(())
}
