//! GDACS feed retrieval and parsing
//!
//! The feed arrives in one of two shapes:
//!
//! - **RSS** (`/xml/rss.xml`): an RSS 2.0 channel whose items carry GDACS
//!   fields in the `gdacs:`, `geo:` and `georss:` namespaces
//! - **GeoJSON** (`/gdacsapi/api/events/geteventlist/...`): a
//!   `FeatureCollection` whose `properties` hold the same information, with a
//!   per-event detail endpoint
//!
//! Both are normalized into [`RawRecord`](crate::models::RawRecord)s by
//! [`FeedParser`], which hands them out lazily through [`FeedItems`].

pub mod client;
pub mod dates;
pub mod geojson;
pub mod rss;

pub use client::FeedClient;
pub use dates::{DateFormat, DateParser, DEFAULT_DATE_FORMATS};

use crate::error::{IngestError, ItemError};
use crate::models::RawRecord;
use sentinel_common::SentinelError;
use std::str::FromStr;

/// Which document shape to expect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedFormat {
    Rss,
    GeoJson,
    /// Decide from the first non-whitespace byte
    #[default]
    Auto,
}

impl FromStr for FeedFormat {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rss" | "xml" => Ok(FeedFormat::Rss),
            "geojson" | "json" => Ok(FeedFormat::GeoJson),
            "auto" | "" => Ok(FeedFormat::Auto),
            other => Err(SentinelError::Config(format!("Unknown feed format '{}'", other))),
        }
    }
}

impl FeedFormat {
    fn resolve(self, bytes: &[u8]) -> Result<FeedFormat, IngestError> {
        if self != FeedFormat::Auto {
            return Ok(self);
        }

        let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        match body.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'<') => Ok(FeedFormat::Rss),
            Some(b'{') => Ok(FeedFormat::GeoJson),
            Some(other) => Err(IngestError::Parse(format!(
                "Unrecognised feed document (starts with {:?})",
                char::from(*other)
            ))),
            None => Err(IngestError::Parse("Feed document is empty".to_string())),
        }
    }
}

/// Turns raw feed bytes into normalized records
#[derive(Debug, Clone, Default)]
pub struct FeedParser {
    format: FeedFormat,
    dates: DateParser,
}

impl FeedParser {
    pub fn new(format: FeedFormat, dates: DateParser) -> Self {
        Self { format, dates }
    }

    /// Start a parse pass over `bytes`.
    ///
    /// Fails only when the document as a whole is unusable. Problems with
    /// individual items are reported through the iterator. Calling `parse`
    /// again on the same bytes starts a fresh pass.
    pub fn parse<'a>(&'a self, bytes: &'a [u8]) -> Result<FeedItems<'a>, IngestError> {
        match self.format.resolve(bytes)? {
            FeedFormat::GeoJson => Ok(FeedItems::GeoJson(geojson::GeoJsonItems::new(
                bytes,
                &self.dates,
            )?)),
            _ => Ok(FeedItems::Rss(rss::RssItems::new(bytes, &self.dates)?)),
        }
    }

    /// Parse one GeoJSON detail `Feature` returned by the per-event endpoint
    pub fn parse_detail(&self, bytes: &[u8]) -> Result<RawRecord, ItemError> {
        geojson::parse_detail(bytes, &self.dates)
    }
}

/// Lazy sequence of parsed items
pub enum FeedItems<'a> {
    Rss(rss::RssItems<'a>),
    GeoJson(geojson::GeoJsonItems<'a>),
}

impl FeedItems<'_> {
    /// The document stopped being readable part-way, so the items yielded
    /// are not the whole feed. GeoJSON is parsed up front and never is.
    pub fn truncated(&self) -> bool {
        match self {
            FeedItems::Rss(items) => items.truncated(),
            FeedItems::GeoJson(_) => false,
        }
    }
}

impl Iterator for FeedItems<'_> {
    type Item = Result<RawRecord, ItemError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            FeedItems::Rss(items) => items.next(),
            FeedItems::GeoJson(items) => items.next(),
        }
    }
}

/// Resolve coordinates from a dedicated lat/lon pair, falling back to a
/// combined `"lat lon"` point string. Out-of-range values count as malformed.
pub(crate) fn resolve_coordinates(
    lat: Option<&str>,
    lon: Option<&str>,
    point: Option<&str>,
) -> Option<(f64, f64)> {
    let pair = lat
        .zip(lon)
        .and_then(|(lat, lon)| Some((lat.trim().parse().ok()?, lon.trim().parse().ok()?)))
        .filter(|&(lat, lon)| in_range(lat, lon));

    pair.or_else(|| {
        let mut parts = point?.split_whitespace();
        let lat = parts.next()?.parse().ok()?;
        let lon = parts.next()?.parse().ok()?;
        in_range(lat, lon).then_some((lat, lon))
    })
}

fn in_range(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}
