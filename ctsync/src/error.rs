//! Error types for ctsync
//!
//! `SyncError` is the pass-level taxonomy. A pass aborts on `Configuration`,
//! or on `Bridge`/`Persistence` while loading both sides. After loading, errors
//! are contained to the smallest unit of work and surface in the aggregate
//! result.

use thiserror::Error;

/// Pass-level error taxonomy
#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed external record, excluded from matching
    #[error("Validation error: {0}")]
    Validation(String),

    /// Automation bridge call failure
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Oracle failure (downgraded to the deterministic judge, never fatal)
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// Durable store failure
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// Missing credentials or unknown owner
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<ctsync_common::Error> for SyncError {
    fn from(err: ctsync_common::Error) -> Self {
        SyncError::Configuration(err.to_string())
    }
}

/// Strict decoder failures for oracle responses
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty response")]
    Empty,

    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' has the wrong type: {detail}")]
    WrongType { field: &'static str, detail: String },

    #[error("confidence {0} outside 0-100")]
    ConfidenceOutOfRange(i64),
}

/// Oracle client errors
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Malformed response: {0}")]
    Malformed(#[from] DecodeError),

    #[error("Authentication failed")]
    Unauthorized,
}

/// Automation bridge errors
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Bridge unavailable: {0}")]
    Unavailable(String),

    #[error("Bridge rejected record: {0}")]
    Rejected(String),

    #[error("Bridge range {start}..={end} invalid for {count} records")]
    InvalidRange { start: usize, end: usize, count: usize },

    #[error("IO error: {0}")]
    Io(String),
}

/// Durable store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Contact not found: {0}")]
    NotFound(String),

    #[error("Write failed: {0}")]
    Write(String),

    #[error("IO error: {0}")]
    Io(String),
}
