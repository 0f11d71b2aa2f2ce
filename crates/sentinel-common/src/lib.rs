//! Disaster Sentinel Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the Disaster Sentinel workspace.
//!
//! # Overview
//!
//! - **Types**: the persisted [`DisasterEvent`](types::DisasterEvent) entity and
//!   the GDACS [`AlertLevel`](types::AlertLevel) tiers
//! - **Error Handling**: [`SentinelError`] and the crate [`Result`] alias
//! - **Logging**: `tracing` subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use sentinel_common::logging::{init_logging, LogConfig};
//! use sentinel_common::types::AlertLevel;
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&LogConfig::from_env()?)?;
//!     assert!(AlertLevel::parse("Red").is_severe());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Result, SentinelError};
pub use types::{AlertLevel, DisasterEvent};
