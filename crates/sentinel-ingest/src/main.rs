//! Disaster Sentinel - GDACS ingestion tool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sentinel_common::logging::{init_logging, LogConfig, LogLevel};
use sentinel_ingest::{
    EventStore, IngestConfig, IngestPipeline, IngestScheduler, MemoryStore, PgEventStore,
    RunOptions,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sentinel-ingest")]
#[command(author, version, about = "GDACS disaster feed ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use an in-memory store instead of PostgreSQL
    #[arg(long, global = true)]
    memory: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one ingestion pass and print its summary
    Run {
        /// Re-geocode events that already have a region
        #[arg(long, conflicts_with = "no_geocode")]
        force_geocode: bool,

        /// Skip reverse geocoding
        #[arg(long)]
        no_geocode: bool,
    },

    /// Ingest on a fixed interval until Ctrl-C
    Watch {
        /// Seconds between runs (defaults to SENTINEL_SCHEDULE_INTERVAL_SECS)
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// Print the most recent stored events as JSON lines
    List {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("sentinel-ingest")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    let mut config = IngestConfig::from_env().context("Invalid configuration")?;
    let store = open_store(&config, cli.memory).await?;

    match cli.command {
        Command::Run {
            force_geocode,
            no_geocode,
        } => {
            config.force_geocode = force_geocode;
            config.disable_geocode = no_geocode;

            let pipeline = IngestPipeline::from_config(&config, store)?;
            let summary = pipeline.run(RunOptions::from(&config)).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        },
        Command::Watch { interval_secs } => {
            let interval = interval_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.schedule_interval());
            anyhow::ensure!(!interval.is_zero(), "--interval-secs must be greater than 0");

            let pipeline = Arc::new(IngestPipeline::from_config(&config, store)?);
            let runs = IngestScheduler::new(pipeline, interval, RunOptions::from(&config))
                .run()
                .await;
            info!(runs, "Scheduler stopped");
        },
        Command::List { limit } => {
            for event in store.recent(limit).await? {
                println!("{}", serde_json::to_string(&event)?);
            }
        },
    }

    Ok(())
}

async fn open_store(config: &IngestConfig, memory: bool) -> Result<Arc<dyn EventStore>> {
    if memory {
        info!("Using in-memory event store");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = PgEventStore::connect(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    store.migrate().await?;
    Ok(Arc::new(store))
}
