//! Error types for the metadata server
//!
//! These cover startup and process-level failures. Per-request rejection
//! outcomes are a separate tagged enum ([`crate::voms::AuthRejection`])
//! so the middleware can switch on kind instead of catching a blanket
//! error type.

use std::io;

use thiserror::Error;

/// Result type alias for the metadata server
pub type Result<T> = std::result::Result<T, Error>;

/// Metadata server errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// VO policy file unreadable or malformed. Fatal at startup.
    #[error("Policy configuration error: {0}")]
    PolicyConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
