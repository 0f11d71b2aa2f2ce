//! Error taxonomy for the ingestion pipeline
//!
//! Only [`IngestError`] aborts a run. The per-item errors ([`ItemError`],
//! [`GeocodeError`], [`NotifyError`] and upsert-time [`StoreError`]s) are
//! recovered where they occur and show up in the run summary.

use sentinel_common::SentinelError;
use thiserror::Error;

/// Result type alias for run-level operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Failure to retrieve a document over HTTP
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Transport error fetching {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Timed out fetching {url}")]
    Timeout { url: String },
}

impl FetchError {
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

/// A single feed item could not be turned into a record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
    #[error("Malformed item #{position}: {message}")]
    Parse { position: usize, message: String },

    #[error("Invalid item #{position}: {message}")]
    Validation { position: usize, message: String },
}

/// Reverse-geocoding failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeocodeError {
    /// Timeouts, connection resets, 429 and 5xx responses
    #[error("Transient geocoding failure: {0}")]
    Transient(String),

    /// Anything a retry will not fix
    #[error("Geocoding failed: {0}")]
    Permanent(String),

    #[error("Geocoding gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl GeocodeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GeocodeError::Transient(_))
    }
}

/// Persistence failure
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Alert delivery failure
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Alert delivery failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Alert endpoint rejected event {event_id} with status {status}")]
    Rejected { event_id: String, status: u16 },
}

/// Run-level failure
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Feed fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Feed document could not be parsed: {0}")]
    Parse(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] SentinelError),

    #[error("An ingestion run is already in progress")]
    RunInProgress,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_geocode_errors_are_retryable() {
        assert!(GeocodeError::Transient("503".into()).is_transient());
        assert!(!GeocodeError::Permanent("400".into()).is_transient());
        assert!(!GeocodeError::Exhausted {
            attempts: 3,
            last: "timeout".into()
        }
        .is_transient());
    }

    #[test]
    fn test_item_error_messages_carry_position() {
        let err = ItemError::Validation {
            position: 4,
            message: "missing event id".into(),
        };
        assert_eq!(err.to_string(), "Invalid item #4: missing event id");
    }
}
