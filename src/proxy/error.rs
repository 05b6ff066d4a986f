//! Proxy error types.

use std::net::SocketAddr;
use thiserror::Error;

/// Errors raised by the connection-lifecycle engine.
///
/// Only [`ProxyError::NoBackend`] and [`ProxyError::Dial`] cross a task
/// boundary (from upstream selection back to the accept handler); the rest
/// classify failures that are handled and logged where they occur.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Failed to bind a listening socket. Retried, never fatal.
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// The listening address that failed to bind.
        address: SocketAddr,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to accept a connection.
    #[error("failed to accept connection on {address}: {source}")]
    Accept {
        /// The listening address.
        address: SocketAddr,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to dial an upstream (includes connect timeouts).
    #[error("failed to dial upstream {address}: {source}")]
    Dial {
        /// The upstream address.
        address: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// No healthy upstream available for the application.
    #[error("no active backend for application '{app}'")]
    NoBackend {
        /// The application name.
        app: String,
    },

    /// IO error while relaying between a connection pair.
    #[error("relay failed: {0}")]
    Relay(#[source] std::io::Error),
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;
