//! Common error types for ethpool-proxy.
//!
//! This module provides a centralized Error enum using thiserror,
//! with conversions from underlying error types used throughout the crate.
//! Failures that are reported back to miners over the wire live in
//! [`crate::proxy::RpcError`] instead; they carry protocol codes and never
//! abort anything beyond the call that produced them.

use thiserror::Error;

/// Main error type for ethpool-proxy operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors from tokio or std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport errors talking to a node
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Line framing errors on a stratum connection
    #[error("Framing error: {0}")]
    Framing(#[from] tokio_util::codec::LinesCodecError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream node replied with an error or unusable data
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Protocol errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Generic errors for development
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
