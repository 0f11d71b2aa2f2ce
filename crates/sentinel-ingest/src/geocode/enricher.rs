//! Rate-limited, retrying region resolution

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{GeocodeRateLimiter, ReverseGeocoder};
use crate::error::GeocodeError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(1500);

/// Bounded retry with a fixed pause between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// `max_attempts` below one is raised to one
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BACKOFF)
    }
}

/// Resolves a region name from coordinates.
///
/// Cheap to clone; clones share the geocoder and the rate limiter.
#[derive(Clone)]
pub struct GeocodeEnricher {
    geocoder: Arc<dyn ReverseGeocoder>,
    limiter: Arc<GeocodeRateLimiter>,
    policy: RetryPolicy,
}

impl GeocodeEnricher {
    pub fn new(
        geocoder: Arc<dyn ReverseGeocoder>,
        limiter: Arc<GeocodeRateLimiter>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            geocoder,
            limiter,
            policy,
        }
    }

    /// Look up the state (or state district) containing the point.
    ///
    /// Every attempt, retries included, waits on the shared limiter first.
    /// Transient failures are retried; `Exhausted` is returned once the
    /// attempts run out. `Ok(None)` means the service had no usable region.
    pub async fn resolve_region(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<String>, GeocodeError> {
        let mut last_error = String::new();

        for attempt in 1..=self.policy.max_attempts {
            self.limiter.acquire().await;

            match self.geocoder.reverse(latitude, longitude).await {
                Ok(address) => {
                    let region = address.as_ref().and_then(|a| a.region()).map(to_ascii);
                    debug!(latitude, longitude, attempt, region = ?region, "Reverse geocode answered");
                    return Ok(region.filter(|r| !r.is_empty()));
                },
                Err(e) if e.is_transient() => {
                    warn!(
                        latitude,
                        longitude,
                        "Geocode attempt {}/{} failed: {}",
                        attempt,
                        self.policy.max_attempts,
                        e
                    );
                    last_error = e.to_string();

                    if attempt < self.policy.max_attempts {
                        tokio::time::sleep(self.policy.backoff).await;
                    }
                },
                Err(e) => return Err(e),
            }
        }

        Err(GeocodeError::Exhausted {
            attempts: self.policy.max_attempts,
            last: last_error,
        })
    }
}

impl std::fmt::Debug for GeocodeEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeocodeEnricher")
            .field("limiter", &self.limiter)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Transliterate to plain ASCII ("Mahārāshtra" becomes "Maharashtra")
pub fn to_ascii(name: &str) -> String {
    let name = name.trim();
    if name.is_ascii() {
        name.to_string()
    } else {
        deunicode::deunicode(name).trim().to_string()
    }
}
