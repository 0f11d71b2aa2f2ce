//! Disaster Sentinel ingestion library
//!
//! Pulls the GDACS disaster feed, keeps the events of one target country,
//! enriches them with a region name, persists them idempotently and raises
//! alerts for severe events.
//!
//! # Components
//!
//! - [`feed`]: HTTP retrieval and RSS / GeoJSON parsing
//! - [`filter`]: country relevance
//! - [`geocode`]: rate-limited reverse geocoding
//! - [`store`]: persistence and the create-or-update adapter
//! - [`reconcile`]: `is_current` bookkeeping
//! - [`notify`]: orange/red alerts
//! - [`pipeline`] and [`scheduler`]: orchestration
//!
//! # Example
//!
//! ```no_run
//! use sentinel_ingest::{IngestConfig, IngestPipeline, MemoryStore, RunOptions};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let pipeline = IngestPipeline::from_config(&config, Arc::new(MemoryStore::new()))?;
//!     let summary = pipeline.run(RunOptions::default()).await?;
//!     println!("{} events created", summary.created);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod error;
pub mod feed;
pub mod filter;
pub mod geocode;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod reconcile;
pub mod scheduler;
pub mod store;

pub use config::IngestConfig;
pub use error::{IngestError, Result};
pub use filter::CountryScope;
pub use models::{RawRecord, RunSummary};
pub use pipeline::{IngestPipeline, PipelineSettings, RunOptions};
pub use scheduler::IngestScheduler;
pub use store::{EventStore, MemoryStore, PgEventStore};
