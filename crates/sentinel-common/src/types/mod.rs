//! Domain types shared by the ingestion pipeline and its read-only consumers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// GDACS alert tier.
///
/// The feed reports the tier as free text ("Green", "ORANGE", "red"), so
/// parsing is case-insensitive and unknown values are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Green,
    Orange,
    Red,
    Other(String),
}

impl AlertLevel {
    /// Parse a feed value, ignoring case and surrounding whitespace
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "green" => AlertLevel::Green,
            "orange" => AlertLevel::Orange,
            "red" => AlertLevel::Red,
            _ => AlertLevel::Other(trimmed.to_string()),
        }
    }

    /// Orange and red events are the ones that warrant a notification
    pub fn is_severe(&self) -> bool {
        matches!(self, AlertLevel::Orange | AlertLevel::Red)
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertLevel::Green => write!(f, "Green"),
            AlertLevel::Orange => write!(f, "Orange"),
            AlertLevel::Red => write!(f, "Red"),
            AlertLevel::Other(s) => write!(f, "{}", s),
        }
    }
}

/// A disaster event as persisted by the ingestion pipeline.
///
/// The pipeline is the only writer. `region` is filled by reverse geocoding and
/// is never cleared by a later run; `is_current` is owned by reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisasterEvent {
    /// Identifier assigned by GDACS (primary key)
    pub event_id: String,

    pub title: String,
    pub description: Option<String>,
    pub link: String,

    pub published_at: Option<DateTime<Utc>>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    /// Administrative region (state) resolved from the coordinates
    pub region: Option<String>,

    pub event_type: Option<String>,
    pub alert_level: Option<String>,
    pub severity: Option<String>,
    pub population_estimate: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,

    /// Whether the event was active in the most recent ingestion run
    pub is_current: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DisasterEvent {
    /// Parsed alert tier, if the feed reported one
    pub fn alert(&self) -> Option<AlertLevel> {
        self.alert_level.as_deref().map(AlertLevel::parse)
    }

    /// True when a non-blank region is already stored
    pub fn has_region(&self) -> bool {
        self.region.as_deref().is_some_and(|r| !r.trim().is_empty())
    }

    /// Both coordinates, when present
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }

    /// Start of the event for ordering purposes: publish date, then from-date
    pub fn sort_key(&self) -> Option<DateTime<Utc>> {
        self.published_at.or(self.from_date)
    }
}
