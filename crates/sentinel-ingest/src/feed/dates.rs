//! Ordered date-format fallback
//!
//! GDACS mixes RFC-1123 style dates ("Wed, 16 Oct 2024 06:33:09 GMT") in the
//! RSS feed with ISO-8601 dates in the GeoJSON API, with and without offsets.
//! Formats are tried in order; the first match wins and a string nothing
//! matches becomes `None`.

use chrono::{DateTime, NaiveDateTime, Utc};
use sentinel_common::SentinelError;
use std::str::FromStr;
use tracing::debug;

/// One accepted date format
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateFormat {
    /// RFC-2822 / RFC-1123, including the `GMT` zone name
    Rfc2822,
    /// RFC-3339 / ISO-8601 with an explicit offset or `Z`
    Rfc3339,
    /// A chrono `strftime` pattern. Patterns without an offset are read as UTC.
    Pattern(String),
}

impl DateFormat {
    fn parse(&self, value: &str) -> Option<DateTime<Utc>> {
        match self {
            DateFormat::Rfc2822 => DateTime::parse_from_rfc2822(value)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            DateFormat::Rfc3339 => DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            DateFormat::Pattern(pattern) => DateTime::parse_from_str(value, pattern)
                .map(|dt| dt.with_timezone(&Utc))
                .or_else(|_| NaiveDateTime::parse_from_str(value, pattern).map(|n| n.and_utc()))
                .ok(),
        }
    }
}

impl FromStr for DateFormat {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "rfc2822" | "rfc1123" => Ok(DateFormat::Rfc2822),
            "rfc3339" | "iso8601" => Ok(DateFormat::Rfc3339),
            _ if s.contains('%') => Ok(DateFormat::Pattern(s.to_string())),
            _ => Err(SentinelError::Config(format!("Unknown date format '{}'", s))),
        }
    }
}

/// Default format chain, as a `|`-separated list
pub const DEFAULT_DATE_FORMATS: &str = "rfc2822|rfc3339|%Y-%m-%dT%H:%M:%S%.f|%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct DateParser {
    formats: Vec<DateFormat>,
}

impl DateParser {
    pub fn new(formats: Vec<DateFormat>) -> Self {
        Self { formats }
    }

    /// Build from a `|`-separated list (commas appear inside patterns)
    pub fn from_list(list: &str) -> Result<Self, SentinelError> {
        let formats = list
            .split('|')
            .filter(|f| !f.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<DateFormat>, _>>()?;

        if formats.is_empty() {
            return Err(SentinelError::Config("Date format list is empty".to_string()));
        }

        Ok(Self::new(formats))
    }

    pub fn formats(&self) -> &[DateFormat] {
        &self.formats
    }

    /// Parse `value` against each format in order
    pub fn parse(&self, value: &str) -> Option<DateTime<Utc>> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        let parsed = self.formats.iter().find_map(|format| format.parse(value));
        if parsed.is_none() {
            debug!(value = %value, "Date matched no known format");
        }
        parsed
    }
}

impl Default for DateParser {
    fn default() -> Self {
        Self::new(vec![
            DateFormat::Rfc2822,
            DateFormat::Rfc3339,
            DateFormat::Pattern("%Y-%m-%dT%H:%M:%S%.f".to_string()),
            DateFormat::Pattern("%Y-%m-%d %H:%M:%S".to_string()),
        ])
    }
}
