//! Intermediate records and run bookkeeping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Default title for items that arrive without one
pub const UNTITLED: &str = "N/A";

/// Lookup key for the per-event detail endpoint of the GeoJSON API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailKey {
    pub event_type: String,
    pub event_id: String,
}

/// A feed item after normalization, before it touches the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub event_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub event_type: Option<String>,
    pub alert_level: Option<String>,
    pub severity: Option<String>,
    pub population_estimate: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,

    /// The feed's own "still active" flag; only feeds reconciliation
    pub is_current_in_feed: bool,

    /// Present for GeoJSON features that can be expanded via the detail API
    pub detail_key: Option<DetailKey>,
}

impl RawRecord {
    pub fn new(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            title: None,
            description: None,
            link: None,
            published_at: None,
            from_date: None,
            to_date: None,
            latitude: None,
            longitude: None,
            event_type: None,
            alert_level: None,
            severity: None,
            population_estimate: None,
            country: None,
            country_code: None,
            is_current_in_feed: false,
            detail_key: None,
        }
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }

    /// Overlay a detail record on a summary record.
    ///
    /// Fields the detail carries win; the summary fills the gaps. The event id
    /// and feed flag of the summary are kept.
    pub fn merge_detail(mut self, detail: RawRecord) -> Self {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        take(&mut self.title, detail.title);
        take(&mut self.description, detail.description);
        take(&mut self.link, detail.link);
        take(&mut self.published_at, detail.published_at);
        take(&mut self.from_date, detail.from_date);
        take(&mut self.to_date, detail.to_date);
        if detail.latitude.is_some() && detail.longitude.is_some() {
            self.latitude = detail.latitude;
            self.longitude = detail.longitude;
        }
        take(&mut self.event_type, detail.event_type);
        take(&mut self.alert_level, detail.alert_level);
        take(&mut self.severity, detail.severity);
        take(&mut self.population_estimate, detail.population_estimate);
        take(&mut self.country, detail.country);
        take(&mut self.country_code, detail.country_code);
        self
    }
}

/// Aggregated outcome of one ingestion run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// Items the parser yielded, valid or not
    pub items_seen: usize,
    /// In-scope records that reached the store adapter
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub geocoded: usize,
    /// Geocoding not needed because the region was already stored
    pub geocode_skipped: usize,
    pub geocode_failed: usize,
    /// Items dropped for parse or validation errors
    pub skipped: usize,
    pub filtered_out: usize,
    pub duplicates: usize,
    pub detail_failures: usize,
    pub store_failures: usize,
    /// The feed document broke off before its end
    pub feed_truncated: bool,
    /// Reconciliation was not attempted because the feed was unusable
    pub reconcile_skipped: bool,
    pub demoted: u64,
    pub promoted: u64,
    pub alerts_sent: usize,
    pub alert_failures: usize,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

impl RunSummary {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            ..Default::default()
        }
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_detail_prefers_detail_fields() {
        let mut summary = RawRecord::new("1000");
        summary.title = Some("Summary".into());
        summary.country = Some("India".into());
        summary.is_current_in_feed = true;

        let mut detail = RawRecord::new("ignored");
        detail.title = Some("Detailed title".into());
        detail.latitude = Some(28.6);
        detail.longitude = Some(77.2);

        let merged = summary.merge_detail(detail);
        assert_eq!(merged.event_id, "1000");
        assert_eq!(merged.title.as_deref(), Some("Detailed title"));
        assert_eq!(merged.country.as_deref(), Some("India"));
        assert_eq!(merged.coordinates(), Some((28.6, 77.2)));
        assert!(merged.is_current_in_feed);
    }

    #[test]
    fn test_merge_detail_ignores_half_coordinates() {
        let mut summary = RawRecord::new("1");
        summary.latitude = Some(1.0);
        summary.longitude = Some(2.0);
        let mut detail = RawRecord::new("1");
        detail.latitude = Some(9.0);

        let merged = summary.merge_detail(detail);
        assert_eq!(merged.coordinates(), Some((1.0, 2.0)));
    }
}
