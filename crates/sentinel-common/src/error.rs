//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for shared operations
pub type Result<T> = std::result::Result<T, SentinelError>;

/// Workspace-wide error type for failures outside the ingestion taxonomy
#[derive(Error, Debug)]
pub enum SentinelError {
    /// Invalid setting, from the environment or a builder
    #[error("Configuration error: {0}")]
    Config(String),
}
