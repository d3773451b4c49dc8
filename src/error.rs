//! Error types for wordscan

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during a WordPress scan
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid URL provided
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to create HTTP client
    #[error("failed to create HTTP client: {0}")]
    HttpClient(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpRequest(String),

    /// HTTP response error status
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),

    /// Configuration is missing required values or is malformed
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Every API credential reports zero remaining requests
    #[error("all API credentials have exhausted their quota")]
    QuotaExhausted,

    /// Vulnerability database returned an unexpected payload
    #[error("unexpected vulnerability database response: {0}")]
    VulnDbResponse(String),

    /// Persistence layer failed
    #[error("store error: {0}")]
    Store(String),

    /// No job stored under the given id
    #[error("scan job not found: {0}")]
    JobNotFound(String),

    /// Invalid output format specified
    #[error("invalid output format: '{0}' (valid: human, json, none)")]
    InvalidOutputFormat(String),

    /// Invalid output sort order specified
    #[error("invalid output sort: '{0}' (valid: name, vulns)")]
    InvalidOutputSort(String),

    /// Output operation failed
    #[error("output failed: {0}")]
    OutputFailed(#[source] std::io::Error),

    /// Filesystem access failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed
    #[error("JSON serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}
