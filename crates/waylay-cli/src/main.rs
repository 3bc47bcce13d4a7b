//! Operator CLI for the job queue (SPEC_FULL.md §6.3): schema bootstrap,
//! ad hoc enqueue, retry, stats, and the worker poll loop.

mod config;

use anyhow::{Context, Result};
use chrono::Duration;
use clap::{Parser, Subcommand};
use config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use waylay_core::{Backend, HandlerRegistry};
use waylay_worker::{shutdown_channel, Worker, WorkerConfig};

#[derive(Parser)]
#[command(name = "waylay")]
#[command(about = "A durable, database-backed delayed-job queue")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the jobs table and its indexes if they don't already exist
    InitDb,

    /// Enqueue a job from a JSON handler descriptor, e.g. `{"type":"noop"}`
    Enqueue {
        handler_json: String,
        #[arg(long)]
        priority: Option<i32>,
        #[arg(long)]
        queue: Option<String>,
    },

    /// Clear `failed_at` on a job so a future `reserve` can pick it up again
    Retry { id: i64 },

    /// Print aggregate counts per derived state
    Stats,

    /// Run the poll loop until interrupted (Ctrl-C) or the parent signals shutdown
    Worker {
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,waylay=debug".into()))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let mut registry = HandlerRegistry::new();
    waylay_handlers::register_all(&mut registry);
    let backend = Backend::connect(&config.database_url, registry)
        .await
        .context("failed to connect to the job store")?;

    match cli.command {
        Commands::InitDb => cmd_init_db(&backend).await,
        Commands::Enqueue { handler_json, priority, queue } => cmd_enqueue(&backend, handler_json, priority, queue).await,
        Commands::Retry { id } => cmd_retry(&backend, id).await,
        Commands::Stats => cmd_stats(&backend).await,
        Commands::Worker { name } => cmd_worker(backend, config, name).await,
    }
}

async fn cmd_init_db(backend: &Backend) -> Result<()> {
    backend.init_db().await?;
    println!("jobs table ready");
    Ok(())
}

async fn cmd_enqueue(backend: &std::sync::Arc<Backend>, handler_json: String, priority: Option<i32>, queue: Option<String>) -> Result<()> {
    let args: serde_json::Value = serde_json::from_str(&handler_json).context("handler descriptor must be valid JSON")?;
    let ctx = backend.handler_context();
    let id = backend.enqueue(&ctx, priority.unwrap_or(0), queue, None, args).await?;
    match id {
        Some(id) => println!("enqueued job {id}"),
        None => println!("handler ran inline (delay_jobs disabled), nothing persisted"),
    }
    Ok(())
}

async fn cmd_retry(backend: &Backend, id: i64) -> Result<()> {
    backend.retry(id).await?;
    println!("job {id} cleared for retry");
    Ok(())
}

async fn cmd_stats(backend: &Backend) -> Result<()> {
    let stats = backend.stats().await?;
    println!(
        "pending={} scheduled={} locked={} failed={}",
        stats.pending, stats.scheduled, stats.locked, stats.failed
    );
    Ok(())
}

async fn cmd_worker(backend: std::sync::Arc<Backend>, config: Config, name_override: Option<String>) -> Result<()> {
    let name = name_override.or(config.worker_name).unwrap_or_else(WorkerConfig::default_name);
    let mut worker_config = WorkerConfig::new(name)
        .with_queues(config.queues)
        .with_priority_range(config.min_priority, config.max_priority);
    if let Some(secs) = config.max_run_time_secs {
        worker_config = worker_config.with_max_run_time(Duration::seconds(secs));
    }
    if let Some(ms) = config.sleep_delay_ms {
        worker_config = worker_config.with_sleep_delay(Duration::milliseconds(ms));
    }
    if let Some(read_ahead) = config.read_ahead {
        worker_config = worker_config.with_read_ahead(read_ahead);
    }
    if let Some(max_attempts) = config.max_attempts {
        worker_config = worker_config.with_max_attempts(max_attempts);
    }

    let worker = Worker::new(backend, worker_config);
    let (shutdown, rx) = shutdown_channel();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received ctrl-c, shutting down");
            shutdown.shutdown();
        }
    });

    tracing::info!(worker = %worker.name(), "starting worker");
    worker.run(rx).await?;
    Ok(())
}
