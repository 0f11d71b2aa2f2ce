//! Severe-event notifications
//!
//! [`AlertNotifier`] decides whether an event warrants an alert (orange or
//! red tier) and hands an [`AlertMessage`] to an [`AlertSink`]. Fan-out to
//! subscribers of the affected region happens behind the sink.

use async_trait::async_trait;
use reqwest::Client;
use sentinel_common::DisasterEvent;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::NotifyError;

/// Rendered alert, ready for delivery
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertMessage {
    pub event_id: String,
    pub title: String,
    pub alert_level: String,
    /// Region subscribers are keyed by; `None` when geocoding found nothing
    pub region: Option<String>,
    pub country: Option<String>,
    pub link: String,
    pub subject: String,
    pub body: String,
}

impl AlertMessage {
    pub fn for_event(event: &DisasterEvent) -> Self {
        let alert_level = event.alert_level.clone().unwrap_or_default();
        let location = event
            .region
            .as_deref()
            .or(event.country.as_deref())
            .unwrap_or("an unknown location");

        let subject = format!(
            "[Disaster Sentinel] Urgent Alert: {} in {} (Alert Level: {})",
            event.title, location, alert_level
        );
        let body = format!(
            "A disaster event has been detected in {location}.\n\n\
             Event Details:\n\
             - Disaster Type: {title}\n\
             - Location: {location}\n\
             - Alert Level: {alert_level}\n\
             - More Information: {link}\n\n\
             Please stay alert and follow guidance from local authorities.\n",
            location = location,
            title = event.title,
            alert_level = alert_level,
            link = event.link,
        );

        Self {
            event_id: event.event_id.clone(),
            title: event.title.clone(),
            alert_level,
            region: event.region.clone(),
            country: event.country.clone(),
            link: event.link.clone(),
            subject,
            body,
        }
    }
}

/// Delivery channel for alerts
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, message: &AlertMessage) -> Result<(), NotifyError>;
}

/// Emits alerts as structured log records
#[derive(Debug, Clone, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn send(&self, message: &AlertMessage) -> Result<(), NotifyError> {
        warn!(
            event_id = %message.event_id,
            alert_level = %message.alert_level,
            region = ?message.region,
            link = %message.link,
            "{}",
            message.subject
        );
        Ok(())
    }
}

/// POSTs each alert as JSON to a fan-out endpoint
#[derive(Debug, Clone)]
pub struct WebhookAlertSink {
    client: Client,
    url: String,
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn send(&self, message: &AlertMessage) -> Result<(), NotifyError> {
        let response = self.client.post(&self.url).json(message).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                event_id: message.event_id.clone(),
                status: status.as_u16(),
            });
        }
        debug!(event_id = %message.event_id, url = %self.url, "Alert delivered");
        Ok(())
    }
}

#[derive(Clone)]
pub struct AlertNotifier {
    sink: Arc<dyn AlertSink>,
}

impl AlertNotifier {
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self { sink }
    }

    /// Send an alert when the event is orange or red.
    ///
    /// Returns whether an alert was sent.
    pub async fn notify_if_severe(&self, event: &DisasterEvent) -> Result<bool, NotifyError> {
        if !event.alert().is_some_and(|level| level.is_severe()) {
            return Ok(false);
        }

        let message = AlertMessage::for_event(event);
        self.sink.send(&message).await?;
        info!(event_id = %event.event_id, alert_level = %message.alert_level, "Alert sent");
        Ok(true)
    }
}

impl Default for AlertNotifier {
    fn default() -> Self {
        Self::new(Arc::new(LogAlertSink))
    }
}
