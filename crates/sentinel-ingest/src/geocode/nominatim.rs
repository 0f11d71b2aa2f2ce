//! Nominatim `/reverse` client

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{Address, ReverseGeocoder};
use crate::error::GeocodeError;

pub const DEFAULT_GEOCODE_URL: &str = "https://nominatim.openstreetmap.org";

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: Option<Address>,
    #[serde(default)]
    error: Option<String>,
}

/// Reverse geocoder backed by a Nominatim-compatible service.
///
/// The public instance requires an identifying user agent and at most one
/// request per second; pacing is the caller's job (see
/// [`GeocodeRateLimiter`](super::GeocodeRateLimiter)).
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| GeocodeError::Permanent(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<Option<Address>, GeocodeError> {
        let url = format!("{}/reverse", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("accept-language", "en".to_string()),
            ])
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(GeocodeError::Transient(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(GeocodeError::Permanent(format!("HTTP {}", status.as_u16())));
        }

        let body = response.bytes().await.map_err(classify)?;
        let parsed: ReverseResponse = serde_json::from_slice(&body)
            .map_err(|e| GeocodeError::Permanent(format!("Malformed response: {}", e)))?;

        if let Some(error) = parsed.error {
            debug!(latitude, longitude, error = %error, "No address for coordinates");
            return Ok(None);
        }

        Ok(parsed.address)
    }
}

fn classify(err: reqwest::Error) -> GeocodeError {
    if err.is_builder() {
        GeocodeError::Permanent(err.to_string())
    } else {
        GeocodeError::Transient(err.to_string())
    }
}
