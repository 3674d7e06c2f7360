//! CLI command definitions and handlers.
//!
//! The binary has two long-running entry points (`discover`, `work`) and a
//! set of thin operator commands over the work queue (`stats`, `failed`,
//! `retry-failed`, `clear`). Credentials and the store location come from
//! the environment, not from flags.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::catalog::{CatalogClient, DetailProcessor, LogSink, SearchDimensions};
use crate::config::HarvestConfig;
use crate::coordinator::{Coordinator, CoordinatorConfig};
use crate::queue::WorkQueue;
use crate::signer::{Credential, RequestSigner};
use crate::worker::{default_worker_id, Worker, WorkerConfig};

/// Distributed harvester for a rate-limited listings catalog.
#[derive(Parser)]
#[command(name = "portal-harvest")]
#[command(about = "Discover and fetch catalog listings through a shared work queue")]
#[command(version)]
#[command(
    long_about = "portal-harvest discovers listing identifiers from a catalog search API and\n\
fetches per-listing detail across any number of independent worker processes.\n\
The coordinator and workers share state only through the coordination store,\n\
so each can be started, stopped and restarted independently.\n\n\
Configuration is read from the environment; see HarvestConfig::from_env."
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run one full discovery pass and enqueue every identifier found.
    Discover,

    /// Consume the queue until it drains or an interrupt arrives.
    Work(WorkArgs),

    /// Show queue statistics.
    Stats,

    /// List identifiers that exhausted their retries.
    Failed,

    /// Move every failed identifier back onto the queue.
    RetryFailed,

    /// Destroy all queue state for the portal. Irreversible.
    Clear(ClearArgs),
}

/// Arguments for `portal-harvest work`.
#[derive(Parser, Debug)]
pub struct WorkArgs {
    /// Worker identity used in logs (default: derived from the process id).
    #[arg(long, env = "HARVEST_WORKER_ID")]
    pub worker_id: Option<String>,
}

/// Arguments for `portal-harvest clear`.
#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Confirm the destructive reset.
    #[arg(long)]
    pub force: bool,
}

/// Parses CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Runs the parsed CLI command.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = HarvestConfig::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Discover => run_discover(&config).await,
        Commands::Work(args) => run_work(&config, args).await,
        Commands::Stats => run_stats(&config).await,
        Commands::Failed => run_failed(&config).await,
        Commands::RetryFailed => run_retry_failed(&config).await,
        Commands::Clear(args) => run_clear(&config, args).await,
    }
}

async fn run_discover(config: &HarvestConfig) -> anyhow::Result<()> {
    let queue = Arc::new(connect_queue(config).await?);
    let client = Arc::new(build_client(config)?);
    let dimensions = SearchDimensions::with_overrides(
        config.regions.clone(),
        config.categories.clone(),
        config.deal_types.clone(),
    );

    let coordinator = Coordinator::new(
        queue,
        client,
        dimensions,
        CoordinatorConfig {
            max_pages: config.max_pages,
            request_delay: config.request_delay,
        },
        shutdown_channel(),
    );

    let report = coordinator.run().await?;

    println!("Discovery pass complete:");
    println!("  combinations:        {}", report.combinations);
    println!("  failed combinations: {}", report.failed_combinations);
    println!("  pages fetched:       {}", report.pages_fetched);
    println!("  newly discovered:    {}", report.discovered);

    Ok(())
}

async fn run_work(config: &HarvestConfig, args: WorkArgs) -> anyhow::Result<()> {
    let queue = Arc::new(connect_queue(config).await?);
    let client = Arc::new(build_client(config)?);
    let processor = Arc::new(DetailProcessor::new(client, Arc::new(LogSink)));

    let worker_id = args.worker_id.unwrap_or_else(default_worker_id);
    let worker = Worker::new(
        worker_id,
        queue,
        processor,
        WorkerConfig {
            dequeue_timeout: config.dequeue_timeout,
            max_empty_checks: config.max_empty_checks,
            retry_limit: config.retry_limit,
            request_delay: config.request_delay,
            error_backoff: config.error_backoff,
        },
        shutdown_channel(),
    );

    let report = worker.run().await?;

    println!("Worker finished:");
    println!("  processed: {}", report.processed);
    println!("  skipped:   {}", report.skipped);
    println!("  requeued:  {}", report.requeued);
    println!("  exhausted: {}", report.exhausted);

    Ok(())
}

async fn run_stats(config: &HarvestConfig) -> anyhow::Result<()> {
    let queue = connect_queue(config).await?;
    let stats = queue.stats().await?;

    println!("Queue stats for '{}':", stats.portal);
    println!("  queue depth:      {}", stats.queue_depth);
    println!("  total discovered: {}", stats.total_discovered);
    println!("  processed:        {}", stats.processed_count);
    println!("  failed:           {}", stats.failed_count);
    match stats.started_at {
        Some(ts) => println!("  started at:       {}", ts.to_rfc3339()),
        None => println!("  started at:       (not initialized)"),
    }

    Ok(())
}

async fn run_failed(config: &HarvestConfig) -> anyhow::Result<()> {
    let queue = connect_queue(config).await?;
    let failed = queue.failed_ids().await?;

    if failed.is_empty() {
        println!("No failed items.");
        return Ok(());
    }

    println!("{} failed item(s):", failed.len());
    for id in failed {
        println!("  {}", id);
    }

    Ok(())
}

async fn run_retry_failed(config: &HarvestConfig) -> anyhow::Result<()> {
    let queue = connect_queue(config).await?;
    let count = queue.retry_all_failed().await?;
    println!("Requeued {} failed item(s).", count);
    Ok(())
}

async fn run_clear(config: &HarvestConfig, args: ClearArgs) -> anyhow::Result<()> {
    if !args.force {
        anyhow::bail!(
            "clear permanently deletes all queue state for '{}'; re-run with --force to confirm",
            config.portal
        );
    }

    let queue = connect_queue(config).await?;
    queue.clear().await?;
    println!("Cleared all queue state for '{}'.", config.portal);
    Ok(())
}

async fn connect_queue(config: &HarvestConfig) -> anyhow::Result<WorkQueue> {
    WorkQueue::connect(&config.redis_url, &config.portal)
        .await
        .with_context(|| format!("Failed to connect to coordination store at {}", config.redis_url))
}

fn build_client(config: &HarvestConfig) -> anyhow::Result<CatalogClient> {
    let base_url = config
        .api_base_url
        .as_deref()
        .context("HARVEST_API_BASE must be set for this command")?;

    let signer = Credential::from_env().map(RequestSigner::new);
    match signer {
        Some(_) => info!("Request signing enabled"),
        None => warn!("No complete credential in environment, running unsigned"),
    }

    Ok(CatalogClient::new(base_url, signer, config.page_size))
}

/// Creates a shutdown receiver wired to Ctrl-C.
fn shutdown_channel() -> broadcast::Receiver<()> {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, draining");
            let _ = shutdown_tx.send(());
        }
    });
    shutdown_rx
}
