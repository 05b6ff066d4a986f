//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),

    /// Failed to read the configuration file.
    #[error("failed to read configuration file '{path}': {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse JSON content.
    #[error("failed to parse JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Configuration validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),

    /// Invalid listening port.
    #[error("invalid listening port: {0}")]
    InvalidPort(u16),

    /// Invalid upstream address.
    #[error("invalid upstream address '{address}': {message}")]
    InvalidAddress {
        /// The offending address string.
        address: String,
        /// Why it was rejected.
        message: String,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
