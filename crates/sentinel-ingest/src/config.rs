//! Ingestion configuration
//!
//! Everything is read from `SENTINEL_*` environment variables (plus
//! `DATABASE_URL`), after loading a `.env` file if one is present.

use sentinel_common::SentinelError;
use std::str::FromStr;
use std::time::Duration;

use crate::feed::{client::DEFAULT_USER_AGENT, DateParser, FeedFormat, DEFAULT_DATE_FORMATS};
use crate::filter::CountryScope;
use crate::geocode::nominatim::DEFAULT_GEOCODE_URL;
use crate::geocode::RetryPolicy;

pub const DEFAULT_FEED_URL: &str = "https://www.gdacs.org/xml/rss.xml";
pub const DEFAULT_DETAIL_URL: &str =
    "https://www.gdacs.org/gdacsapi/api/events/geteventdata?eventtype={eventtype}&eventid={eventid}";
pub const DEFAULT_FEED_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TARGET_COUNTRY: &str = "India";
pub const DEFAULT_TARGET_COUNTRY_CODE: &str = "IND";
pub const DEFAULT_GEOCODE_MIN_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_GEOCODE_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_GEOCODE_BACKOFF_MS: u64 = 1500;
pub const DEFAULT_GEOCODE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_SCHEDULE_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/sentinel";
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub feed_url: String,
    pub feed_format: FeedFormat,
    pub feed_timeout_secs: u64,
    /// Expand GeoJSON features through the per-event detail endpoint
    pub fetch_details: bool,
    /// `{eventtype}` / `{eventid}` URL template
    pub detail_url_template: String,
    /// `|`-separated, tried in order
    pub date_formats: String,

    pub target_country: String,
    pub target_country_code: String,

    pub geocode_url: String,
    pub geocode_user_agent: String,
    pub geocode_min_interval_ms: u64,
    pub geocode_max_attempts: u32,
    pub geocode_backoff_ms: u64,
    pub geocode_timeout_secs: u64,

    /// Unset means alerts go to the log
    pub alert_webhook_url: Option<String>,

    /// Records processed at once; geocoding stays globally paced regardless
    pub concurrency: usize,
    pub schedule_interval_secs: u64,

    pub database_url: String,
    pub database_max_connections: u32,

    // Run-level switches, set from the CLI
    pub force_geocode: bool,
    pub disable_geocode: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            feed_format: FeedFormat::Auto,
            feed_timeout_secs: DEFAULT_FEED_TIMEOUT_SECS,
            fetch_details: false,
            detail_url_template: DEFAULT_DETAIL_URL.to_string(),
            date_formats: DEFAULT_DATE_FORMATS.to_string(),
            target_country: DEFAULT_TARGET_COUNTRY.to_string(),
            target_country_code: DEFAULT_TARGET_COUNTRY_CODE.to_string(),
            geocode_url: DEFAULT_GEOCODE_URL.to_string(),
            geocode_user_agent: DEFAULT_USER_AGENT.to_string(),
            geocode_min_interval_ms: DEFAULT_GEOCODE_MIN_INTERVAL_MS,
            geocode_max_attempts: DEFAULT_GEOCODE_MAX_ATTEMPTS,
            geocode_backoff_ms: DEFAULT_GEOCODE_BACKOFF_MS,
            geocode_timeout_secs: DEFAULT_GEOCODE_TIMEOUT_SECS,
            alert_webhook_url: None,
            concurrency: DEFAULT_CONCURRENCY,
            schedule_interval_secs: DEFAULT_SCHEDULE_INTERVAL_SECS,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            database_max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            force_geocode: false,
            disable_geocode: false,
        }
    }
}

impl IngestConfig {
    /// Load `.env` (if any), read the environment and validate
    pub fn from_env() -> Result<Self, SentinelError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            feed_url: string_var("SENTINEL_FEED_URL", defaults.feed_url),
            feed_format: parsed_var("SENTINEL_FEED_FORMAT", defaults.feed_format)?,
            feed_timeout_secs: parsed_var("SENTINEL_FEED_TIMEOUT_SECS", defaults.feed_timeout_secs)?,
            fetch_details: parsed_var("SENTINEL_FEED_FETCH_DETAILS", defaults.fetch_details)?,
            detail_url_template: string_var("SENTINEL_FEED_DETAIL_URL", defaults.detail_url_template),
            date_formats: string_var("SENTINEL_FEED_DATE_FORMATS", defaults.date_formats),
            target_country: string_var("SENTINEL_TARGET_COUNTRY", defaults.target_country),
            target_country_code: string_var(
                "SENTINEL_TARGET_COUNTRY_CODE",
                defaults.target_country_code,
            ),
            geocode_url: string_var("SENTINEL_GEOCODE_URL", defaults.geocode_url),
            geocode_user_agent: string_var("SENTINEL_GEOCODE_USER_AGENT", defaults.geocode_user_agent),
            geocode_min_interval_ms: parsed_var(
                "SENTINEL_GEOCODE_MIN_INTERVAL_MS",
                defaults.geocode_min_interval_ms,
            )?,
            geocode_max_attempts: parsed_var(
                "SENTINEL_GEOCODE_MAX_ATTEMPTS",
                defaults.geocode_max_attempts,
            )?,
            geocode_backoff_ms: parsed_var("SENTINEL_GEOCODE_BACKOFF_MS", defaults.geocode_backoff_ms)?,
            geocode_timeout_secs: parsed_var(
                "SENTINEL_GEOCODE_TIMEOUT_SECS",
                defaults.geocode_timeout_secs,
            )?,
            alert_webhook_url: std::env::var("SENTINEL_ALERT_WEBHOOK_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            concurrency: parsed_var("SENTINEL_CONCURRENCY", defaults.concurrency)?,
            schedule_interval_secs: parsed_var(
                "SENTINEL_SCHEDULE_INTERVAL_SECS",
                defaults.schedule_interval_secs,
            )?,
            database_url: string_var("DATABASE_URL", defaults.database_url),
            database_max_connections: parsed_var(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            )?,
            force_geocode: false,
            disable_geocode: false,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SentinelError> {
        if self.feed_url.trim().is_empty() {
            return Err(invalid("SENTINEL_FEED_URL cannot be empty"));
        }
        if self.feed_timeout_secs == 0 {
            return Err(invalid("SENTINEL_FEED_TIMEOUT_SECS must be greater than 0"));
        }
        if self.fetch_details
            && !(self.detail_url_template.contains("{eventtype}")
                && self.detail_url_template.contains("{eventid}"))
        {
            return Err(invalid(
                "SENTINEL_FEED_DETAIL_URL must contain {eventtype} and {eventid}",
            ));
        }
        DateParser::from_list(&self.date_formats)?;
        if self.target_country.trim().is_empty() && self.target_country_code.trim().is_empty() {
            return Err(invalid(
                "SENTINEL_TARGET_COUNTRY and SENTINEL_TARGET_COUNTRY_CODE cannot both be empty",
            ));
        }
        if self.geocode_user_agent.trim().is_empty() {
            return Err(invalid("SENTINEL_GEOCODE_USER_AGENT cannot be empty"));
        }
        if self.geocode_min_interval_ms == 0 {
            return Err(invalid("SENTINEL_GEOCODE_MIN_INTERVAL_MS must be greater than 0"));
        }
        if self.geocode_max_attempts == 0 {
            return Err(invalid("SENTINEL_GEOCODE_MAX_ATTEMPTS must be greater than 0"));
        }
        if self.geocode_timeout_secs == 0 {
            return Err(invalid("SENTINEL_GEOCODE_TIMEOUT_SECS must be greater than 0"));
        }
        if self.concurrency == 0 {
            return Err(invalid("SENTINEL_CONCURRENCY must be greater than 0"));
        }
        if self.schedule_interval_secs == 0 {
            return Err(invalid("SENTINEL_SCHEDULE_INTERVAL_SECS must be greater than 0"));
        }
        if self.database_max_connections == 0 {
            return Err(invalid("DATABASE_MAX_CONNECTIONS must be greater than 0"));
        }
        Ok(())
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }

    pub fn geocode_min_interval(&self) -> Duration {
        Duration::from_millis(self.geocode_min_interval_ms)
    }

    pub fn geocode_timeout(&self) -> Duration {
        Duration::from_secs(self.geocode_timeout_secs)
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_interval_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.geocode_max_attempts,
            Duration::from_millis(self.geocode_backoff_ms),
        )
    }

    pub fn scope(&self) -> CountryScope {
        CountryScope::new(&self.target_country, &self.target_country_code)
    }

    pub fn date_parser(&self) -> Result<DateParser, SentinelError> {
        DateParser::from_list(&self.date_formats)
    }
}

fn invalid(message: &str) -> SentinelError {
    SentinelError::Config(message.to_string())
}

fn string_var(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn parsed_var<T>(key: &str, default: T) -> Result<T, SentinelError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|e| SentinelError::Config(format!("Invalid {}='{}': {}", key, value, e))),
        _ => Ok(default),
    }
}
