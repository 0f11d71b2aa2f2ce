//! Periodic ingestion
//!
//! Runs the pipeline on a fixed interval until shutdown. Ticks missed while a
//! long run is in progress are skipped rather than queued, so runs never
//! overlap and never burst.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::pipeline::{IngestPipeline, RunOptions};

pub struct IngestScheduler {
    pipeline: Arc<IngestPipeline>,
    interval: Duration,
    options: RunOptions,
}

impl IngestScheduler {
    pub fn new(pipeline: Arc<IngestPipeline>, interval: Duration, options: RunOptions) -> Self {
        Self {
            pipeline,
            interval,
            options,
        }
    }

    /// Run until Ctrl-C
    pub async fn run(self) -> usize {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until `shutdown` resolves; returns the number of runs attempted.
    ///
    /// The first run starts immediately. A failed run is logged and the
    /// schedule continues.
    pub async fn run_until<F>(self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        info!(interval_secs = self.interval.as_secs(), "Starting ingestion scheduler");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut runs = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(runs, "Shutdown requested, stopping scheduler");
                    break;
                }
                _ = ticker.tick() => {
                    runs += 1;
                    match self.pipeline.run(self.options).await {
                        Ok(summary) => info!(
                            run_id = %summary.run_id,
                            created = summary.created,
                            updated = summary.updated,
                            "Scheduled run complete"
                        ),
                        Err(e) => error!(error = %e, "Scheduled run failed"),
                    }
                }
            }
        }

        runs
    }
}
