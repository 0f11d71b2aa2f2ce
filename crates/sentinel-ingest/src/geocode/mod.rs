//! Reverse geocoding: coordinates to an administrative region
//!
//! [`GeocodeEnricher`] is what the rest of the pipeline talks to. It wraps a
//! [`ReverseGeocoder`] implementation (HTTP in production, fakes in tests)
//! with the process-wide [`GeocodeRateLimiter`], bounded retries and region
//! extraction.

pub mod enricher;
pub mod limiter;
pub mod nominatim;

pub use enricher::{GeocodeEnricher, RetryPolicy};
pub use limiter::GeocodeRateLimiter;
pub use nominatim::NominatimGeocoder;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::GeocodeError;

/// Address components returned by a reverse lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub state_district: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}

impl Address {
    /// `state`, falling back to `state_district`; blanks count as missing
    pub fn region(&self) -> Option<&str> {
        fn non_blank(v: &Option<String>) -> Option<&str> {
            v.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }
        non_blank(&self.state).or_else(|| non_blank(&self.state_district))
    }
}

/// A single reverse-geocoding request, without rate limiting or retries.
///
/// `Ok(None)` means the service answered but knows no address for the point.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<Option<Address>, GeocodeError>;
}
