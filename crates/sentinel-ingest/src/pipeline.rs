//! Ingestion run orchestration
//!
//! One run: fetch the feed, parse it, keep the in-scope records, drop
//! in-run duplicates, optionally expand each record through the detail
//! endpoint, upsert (geocoding where needed), reconcile `is_current`, then
//! notify for severe events that are new or changed tier.

use futures::stream::{self, StreamExt};
use sentinel_common::{DisasterEvent, SentinelError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{IngestConfig, DEFAULT_CONCURRENCY, DEFAULT_DETAIL_URL, DEFAULT_FEED_URL};
use crate::error::{IngestError, Result, StoreError};
use crate::feed::{FeedClient, FeedParser};
use crate::filter::CountryScope;
use crate::geocode::{GeocodeEnricher, GeocodeRateLimiter, NominatimGeocoder};
use crate::models::{RawRecord, RunSummary};
use crate::notify::{AlertNotifier, AlertSink, LogAlertSink, WebhookAlertSink};
use crate::reconcile::CurrencyReconciler;
use crate::store::{EventStore, GeocodeOutcome, UpsertAdapter, UpsertOutcome};

/// Timeout for alert webhook calls
const ALERT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-run switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Re-geocode even when a region is already stored
    pub force_geocode: bool,
    /// Skip geocoding entirely
    pub disable_geocode: bool,
}

impl From<&IngestConfig> for RunOptions {
    fn from(config: &IngestConfig) -> Self {
        Self {
            force_geocode: config.force_geocode,
            disable_geocode: config.disable_geocode,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub feed_url: String,
    pub feed_timeout: Duration,
    pub fetch_details: bool,
    pub detail_url_template: String,
    pub concurrency: usize,
    pub scope: CountryScope,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            feed_timeout: Duration::from_secs(30),
            fetch_details: false,
            detail_url_template: DEFAULT_DETAIL_URL.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            scope: CountryScope::default(),
        }
    }
}

impl From<&IngestConfig> for PipelineSettings {
    fn from(config: &IngestConfig) -> Self {
        Self {
            feed_url: config.feed_url.clone(),
            feed_timeout: config.feed_timeout(),
            fetch_details: config.fetch_details,
            detail_url_template: config.detail_url_template.clone(),
            concurrency: config.concurrency,
            scope: config.scope(),
        }
    }
}

/// Result of processing one record
struct Processed {
    detail_failed: bool,
    upsert: std::result::Result<UpsertOutcome, StoreError>,
}

pub struct IngestPipeline {
    settings: PipelineSettings,
    feed: FeedClient,
    parser: FeedParser,
    store: Arc<dyn EventStore>,
    enricher: Option<GeocodeEnricher>,
    notifier: AlertNotifier,
    reconciler: CurrencyReconciler,
    run_lock: Mutex<()>,
}

impl IngestPipeline {
    /// Pipeline without geocoding that alerts to the log
    pub fn new(settings: PipelineSettings, feed: FeedClient, store: Arc<dyn EventStore>) -> Self {
        let reconciler = CurrencyReconciler::new(Arc::clone(&store), settings.scope.clone());
        Self {
            settings,
            feed,
            parser: FeedParser::default(),
            store,
            enricher: None,
            notifier: AlertNotifier::default(),
            reconciler,
            run_lock: Mutex::new(()),
        }
    }

    /// Wire every collaborator from configuration
    pub fn from_config(config: &IngestConfig, store: Arc<dyn EventStore>) -> Result<Self> {
        let feed = FeedClient::new(&config.geocode_user_agent)?;
        let parser = FeedParser::new(config.feed_format, config.date_parser()?);

        let limiter = Arc::new(GeocodeRateLimiter::new(config.geocode_min_interval())?);
        let geocoder = NominatimGeocoder::new(
            &config.geocode_url,
            &config.geocode_user_agent,
            config.geocode_timeout(),
        )
        .map_err(|e| SentinelError::Config(e.to_string()))?;
        let enricher = GeocodeEnricher::new(Arc::new(geocoder), limiter, config.retry_policy());

        let sink: Arc<dyn AlertSink> = match &config.alert_webhook_url {
            Some(url) => Arc::new(
                WebhookAlertSink::new(url.clone(), ALERT_TIMEOUT)
                    .map_err(|e| SentinelError::Config(e.to_string()))?,
            ),
            None => Arc::new(LogAlertSink),
        };

        Ok(Self::new(PipelineSettings::from(config), feed, store)
            .with_parser(parser)
            .with_enricher(Some(enricher))
            .with_notifier(AlertNotifier::new(sink)))
    }

    pub fn with_parser(mut self, parser: FeedParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_enricher(mut self, enricher: Option<GeocodeEnricher>) -> Self {
        self.enricher = enricher;
        self
    }

    pub fn with_notifier(mut self, notifier: AlertNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Execute one ingestion run.
    ///
    /// Fails fast with [`IngestError::RunInProgress`] if another run holds
    /// the lock. Only fetch failures, unparseable documents and
    /// reconciliation store errors abort a run; per-record problems are
    /// counted in the returned summary.
    pub async fn run(&self, options: RunOptions) -> Result<RunSummary> {
        let _guard = self.run_lock.try_lock().map_err(|_| IngestError::RunInProgress)?;

        let run_id = Uuid::new_v4();
        let span = info_span!("ingest_run", run_id = %run_id);
        self.execute(run_id, options).instrument(span).await
    }

    async fn execute(&self, run_id: Uuid, options: RunOptions) -> Result<RunSummary> {
        let started = Instant::now();
        let mut summary = RunSummary::new(run_id);
        info!(
            url = %self.settings.feed_url,
            force_geocode = options.force_geocode,
            disable_geocode = options.disable_geocode,
            "Starting ingestion run"
        );

        let body = self
            .feed
            .fetch(&self.settings.feed_url, self.settings.feed_timeout)
            .await?;
        let records = self.collect_records(&body, &mut summary)?;

        let seen: HashSet<String> = records
            .iter()
            .filter(|r| r.is_current_in_feed)
            .map(|r| r.event_id.clone())
            .collect();

        // ====================================================================
        // Per-record processing
        // ====================================================================

        let adapter = UpsertAdapter::new(Arc::clone(&self.store), self.enricher.clone())
            .force_geocode(options.force_geocode)
            .disable_geocode(options.disable_geocode);

        let processed: Vec<Processed> = stream::iter(records)
            .map(|record| {
                let span = info_span!("record", event_id = %record.event_id);
                self.process(&adapter, record).instrument(span)
            })
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let mut to_notify: Vec<DisasterEvent> = Vec::new();
        for item in processed {
            summary.processed += 1;
            if item.detail_failed {
                summary.detail_failures += 1;
            }
            match item.upsert {
                Ok(outcome) => {
                    if outcome.created {
                        summary.created += 1;
                    } else {
                        summary.updated += 1;
                    }
                    match outcome.geocode {
                        GeocodeOutcome::Resolved => summary.geocoded += 1,
                        GeocodeOutcome::AlreadyKnown => summary.geocode_skipped += 1,
                        GeocodeOutcome::Failed => summary.geocode_failed += 1,
                        _ => {},
                    }
                    if outcome.alert_changed {
                        to_notify.push(outcome.event);
                    }
                },
                Err(e) => {
                    summary.store_failures += 1;
                    warn!(error = %e, "Failed to store event");
                },
            }
        }

        // ====================================================================
        // Reconciliation
        // ====================================================================

        if let Some(reason) = unusable_feed(&summary) {
            summary.reconcile_skipped = true;
            warn!(
                items_seen = summary.items_seen,
                skipped = summary.skipped,
                "{}, skipping reconciliation",
                reason
            );
        } else {
            let reconciled = self.reconciler.reconcile(&seen).await?;
            summary.demoted = reconciled.demoted;
            summary.promoted = reconciled.promoted;
        }

        // ====================================================================
        // Notifications
        // ====================================================================

        for event in &to_notify {
            match self.notifier.notify_if_severe(event).await {
                Ok(true) => summary.alerts_sent += 1,
                Ok(false) => {},
                Err(e) => {
                    summary.alert_failures += 1;
                    warn!(event_id = %event.event_id, error = %e, "Failed to send alert");
                },
            }
        }

        summary.duration = started.elapsed();
        info!(
            items_seen = summary.items_seen,
            processed = summary.processed,
            created = summary.created,
            updated = summary.updated,
            geocoded = summary.geocoded,
            skipped = summary.skipped,
            filtered_out = summary.filtered_out,
            demoted = summary.demoted,
            alerts_sent = summary.alerts_sent,
            duration_ms = summary.duration.as_millis() as u64,
            "Ingestion run finished"
        );

        Ok(summary)
    }

    /// Parse, filter and de-duplicate; first occurrence of an id wins
    fn collect_records(&self, body: &[u8], summary: &mut RunSummary) -> Result<Vec<RawRecord>> {
        let mut ids = HashSet::new();
        let mut records = Vec::new();

        let mut items = self.parser.parse(body)?;
        for item in items.by_ref() {
            summary.items_seen += 1;
            let record = match item {
                Ok(record) => record,
                Err(e) => {
                    summary.skipped += 1;
                    warn!(error = %e, "Skipping feed item");
                    continue;
                },
            };

            if !self.settings.scope.is_relevant(&record) {
                summary.filtered_out += 1;
                continue;
            }
            if !ids.insert(record.event_id.clone()) {
                summary.duplicates += 1;
                debug!(event_id = %record.event_id, "Duplicate event in feed, keeping first");
                continue;
            }
            records.push(record);
        }

        summary.feed_truncated = items.truncated();
        if summary.feed_truncated {
            warn!(
                items = summary.items_seen,
                "Feed document broke off early, later items were not read"
            );
        }

        debug!(
            items = summary.items_seen,
            in_scope = records.len(),
            "Parsed feed document"
        );
        Ok(records)
    }

    async fn process(&self, adapter: &UpsertAdapter, record: RawRecord) -> Processed {
        let (record, detail_failed) = self.expand(record).await;
        Processed {
            detail_failed,
            upsert: adapter.upsert(record).await,
        }
    }

    /// Overlay the detail document when detail fetching is on; on failure
    /// the summary record is used as-is
    async fn expand(&self, record: RawRecord) -> (RawRecord, bool) {
        if !self.settings.fetch_details {
            return (record, false);
        }
        let Some(key) = record.detail_key.clone() else {
            return (record, false);
        };

        let detail = self
            .feed
            .fetch_event_detail(
                &self.settings.detail_url_template,
                &key.event_type,
                &key.event_id,
                self.settings.feed_timeout,
            )
            .await;

        match detail {
            Ok(bytes) => match self.parser.parse_detail(&bytes) {
                Ok(detail) => (record.merge_detail(detail), false),
                Err(e) => {
                    warn!(error = %e, "Unusable event detail, using summary record");
                    (record, true)
                },
            },
            Err(e) => {
                warn!(error = %e, "Event detail fetch failed, using summary record");
                (record, true)
            },
        }
    }
}

/// Why a run must not demote anything, if it must not.
///
/// Reconciling against a feed that was empty, broke off early or had no
/// readable item would demote events that are still current.
fn unusable_feed(summary: &RunSummary) -> Option<&'static str> {
    if summary.items_seen == 0 {
        Some("Feed contained no items")
    } else if summary.feed_truncated {
        Some("Feed document was truncated")
    } else if summary.skipped == summary.items_seen {
        Some("No feed item could be read")
    } else {
        None
    }
}
