//! HTTP retrieval of feed documents

use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::FetchError;

/// Default user agent sent with feed requests
pub const DEFAULT_USER_AGENT: &str = concat!("disaster-sentinel/", env!("CARGO_PKG_VERSION"));

/// Thin wrapper around a shared `reqwest::Client`.
///
/// No retries happen here: a failed fetch aborts the run and the next
/// scheduled run tries again.
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: Client,
}

impl FeedClient {
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::from_reqwest("<client>", e))?;
        Ok(Self { client })
    }

    /// Reuse an existing client (tests, shared connection pools)
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// GET `url` and return the body.
    ///
    /// Non-2xx statuses, transport failures and timeouts become [`FetchError`]s.
    pub async fn fetch(&self, url: &str, timeout: Duration) -> Result<Bytes, FetchError> {
        debug!(url = %url, timeout_secs = timeout.as_secs(), "Fetching feed document");

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        info!(url = %url, bytes = body.len(), "Fetched feed document");
        Ok(body)
    }

    /// Fetch the detail document of one event.
    ///
    /// `template` carries `{eventtype}` and `{eventid}` placeholders.
    pub async fn fetch_event_detail(
        &self,
        template: &str,
        event_type: &str,
        event_id: &str,
        timeout: Duration,
    ) -> Result<Bytes, FetchError> {
        let url = detail_url(template, event_type, event_id);
        self.fetch(&url, timeout).await
    }
}

pub(crate) fn detail_url(template: &str, event_type: &str, event_id: &str) -> String {
    template
        .replace("{eventtype}", event_type)
        .replace("{eventid}", event_id)
}
