//! Shared fixtures for the ingestion integration tests
//!
//! - GDACS-shaped RSS documents built from [`Item`]s
//! - wiremock helpers for the feed and the reverse-geocoding service
//! - a recording [`AlertSink`]
//! - a pipeline wired to an in-memory store

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use sentinel_ingest::error::NotifyError;
use sentinel_ingest::feed::FeedClient;
use sentinel_ingest::geocode::{GeocodeEnricher, GeocodeRateLimiter, NominatimGeocoder, RetryPolicy};
use sentinel_ingest::notify::{AlertMessage, AlertNotifier, AlertSink};
use sentinel_ingest::{CountryScope, IngestPipeline, MemoryStore, PipelineSettings};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const FEED_PATH: &str = "/xml/rss.xml";

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sentinel_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Feed documents
// ============================================================================

/// One `<item>` of a GDACS RSS feed
#[derive(Debug, Clone)]
pub struct Item {
    pub id: Option<String>,
    pub title: String,
    pub country: String,
    pub iso3: String,
    pub point: Option<(f64, f64)>,
    pub alert: String,
    pub current: bool,
}

impl Item {
    pub fn india(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            title: format!("Event {}", id),
            country: "India".to_string(),
            iso3: "IND".to_string(),
            point: Some((28.6, 77.2)),
            alert: "Green".to_string(),
            current: true,
        }
    }

    pub fn alert(mut self, level: &str) -> Self {
        self.alert = level.to_string();
        self
    }

    pub fn at(mut self, point: Option<(f64, f64)>) -> Self {
        self.point = point;
        self
    }

    pub fn country(mut self, name: &str, iso3: &str) -> Self {
        self.country = name.to_string();
        self.iso3 = iso3.to_string();
        self
    }

    pub fn without_id(mut self) -> Self {
        self.id = None;
        self
    }

    fn to_xml(&self) -> String {
        let mut xml = String::from("<item>\n");
        xml.push_str(&format!("  <title>{}</title>\n", self.title));
        xml.push_str("  <description>GDACS event</description>\n");
        xml.push_str("  <link>https://www.gdacs.org/report.aspx</link>\n");
        xml.push_str("  <pubDate>Wed, 16 Oct 2024 06:33:09 GMT</pubDate>\n");
        if let Some(id) = &self.id {
            xml.push_str(&format!("  <gdacs:eventid>{}</gdacs:eventid>\n", id));
        }
        xml.push_str("  <gdacs:eventtype>EQ</gdacs:eventtype>\n");
        xml.push_str(&format!("  <gdacs:alertlevel>{}</gdacs:alertlevel>\n", self.alert));
        xml.push_str(&format!("  <gdacs:country>{}</gdacs:country>\n", self.country));
        xml.push_str(&format!("  <gdacs:iso3>{}</gdacs:iso3>\n", self.iso3));
        xml.push_str(&format!("  <gdacs:iscurrent>{}</gdacs:iscurrent>\n", self.current));
        if let Some((lat, lon)) = self.point {
            xml.push_str(&format!(
                "  <geo:Point><geo:lat>{}</geo:lat><geo:long>{}</geo:long></geo:Point>\n",
                lat, lon
            ));
        }
        xml.push_str("</item>\n");
        xml
    }
}

pub fn rss(items: &[Item]) -> String {
    let body: String = items.iter().map(Item::to_xml).collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:gdacs="http://www.gdacs.org" xmlns:geo="http://www.w3.org/2003/01/geo/wgs84_pos#">
<channel>
<title>GDACS RSS information</title>
{}</channel>
</rss>"#,
        body
    )
}

// ============================================================================
// HTTP mocks
// ============================================================================

/// Serve `body` as the feed until the server is reset
pub async fn serve_feed(server: &MockServer, body: String) {
    server.reset().await;
    Mock::given(method("GET"))
        .and(path(FEED_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Answer every reverse lookup with `state`
pub async fn serve_state(server: &MockServer, state: &str) {
    Mock::given(method("GET"))
        .and(path("/reverse"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "address": { "state": state, "country": "India", "country_code": "in" }
        })))
        .mount(server)
        .await;
}

pub async fn geocode_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|r| r.iter().filter(|r| r.url.path() == "/reverse").count())
        .unwrap_or(0)
}

// ============================================================================
// Collaborators
// ============================================================================

#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<AlertMessage>>,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<AlertMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn send(&self, message: &AlertMessage) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub fn enricher(geocode_server: &MockServer, min_interval: Duration) -> GeocodeEnricher {
    let geocoder =
        NominatimGeocoder::new(&geocode_server.uri(), "sentinel-test", Duration::from_secs(2))
            .unwrap();
    GeocodeEnricher::new(
        Arc::new(geocoder),
        Arc::new(GeocodeRateLimiter::new(min_interval).unwrap()),
        RetryPolicy::new(2, Duration::from_millis(10)),
    )
}

pub struct Harness {
    pub feed: MockServer,
    pub geocode: MockServer,
    pub store: Arc<MemoryStore>,
    pub sink: Arc<RecordingSink>,
    pub pipeline: IngestPipeline,
}

impl Harness {
    pub async fn start() -> Self {
        Self::with_settings(|_| {}, Duration::from_millis(1)).await
    }

    pub async fn with_settings(
        configure: impl FnOnce(&mut PipelineSettings),
        geocode_interval: Duration,
    ) -> Self {
        init_tracing();
        let feed = MockServer::start().await;
        let geocode = MockServer::start().await;
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::default());

        let mut settings = PipelineSettings {
            feed_url: format!("{}{}", feed.uri(), FEED_PATH),
            feed_timeout: Duration::from_secs(2),
            scope: CountryScope::new("India", "IND"),
            ..Default::default()
        };
        configure(&mut settings);

        let pipeline = IngestPipeline::new(
            settings,
            FeedClient::new("sentinel-test").unwrap(),
            store.clone(),
        )
        .with_enricher(Some(enricher(&geocode, geocode_interval)))
        .with_notifier(AlertNotifier::new(sink.clone()));

        Self {
            feed,
            geocode,
            store,
            sink,
            pipeline,
        }
    }
}
