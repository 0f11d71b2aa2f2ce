//! Process-wide request pacing for the geocoding service

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use sentinel_common::SentinelError;
use std::num::NonZeroU32;
use std::time::Duration;

/// At most one request per `min_interval`, across every task that holds a
/// clone of the surrounding `Arc`.
///
/// Burst is fixed at one, so two requests are never closer together than the
/// interval no matter how many workers are waiting.
pub struct GeocodeRateLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    min_interval: Duration,
}

impl GeocodeRateLimiter {
    pub fn new(min_interval: Duration) -> Result<Self, SentinelError> {
        let quota = Quota::with_period(min_interval)
            .ok_or_else(|| {
                SentinelError::Config("Geocode rate limit interval must be non-zero".to_string())
            })?
            .allow_burst(NonZeroU32::MIN);

        Ok(Self {
            limiter: RateLimiter::direct(quota),
            min_interval,
        })
    }

    /// Wait until the next request may be sent
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

impl std::fmt::Debug for GeocodeRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeocodeRateLimiter")
            .field("min_interval", &self.min_interval)
            .finish()
    }
}
