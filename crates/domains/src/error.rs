//! # Error Types
//!
//! Centralized error handling for the Rusty-Forum ecosystem.
//! Each port boundary gets its own enum; `ForumError` is the umbrella
//! the service layer reports to callers.

use thiserror::Error;

/// Failures raised by a `DocumentStore` implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The addressed document does not exist (e.g., `update` on a missing key).
    #[error("document not found: {0}")]
    NotFound(String),

    /// A transaction guard did not hold at commit time. The store applied
    /// nothing; the caller may re-read and retry.
    #[error("transaction guard failed: {0}")]
    TxnConflict(String),

    /// A stored document could not be decoded into its model type.
    #[error("malformed document at {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Infrastructure failure (network, timeout, poisoned state).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failures raised by a `BlobStore` implementation.
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("blob i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported content type: {0}")]
    UnsupportedType(String),
}

/// Failures raised by a `SummaryProvider`.
///
/// `Unavailable` (no credential configured) is deliberately distinct from a
/// failed call: callers treat it as "do not auto-generate", not as an error.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("summary provider is not configured")]
    Unavailable,

    #[error("summary provider quota exceeded")]
    QuotaExceeded,

    #[error("summary request failed: {0}")]
    Request(String),

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// Failures surfaced by summary orchestration.
#[derive(Error, Debug)]
pub enum SummaryError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The primary error type reported to the presentation layer.
#[derive(Error, Debug)]
pub enum ForumError {
    /// Resource not found (e.g., Post, Comment, Notification)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure (e.g., empty title, blank comment)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Caller is not permitted to perform the operation
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Summary(#[from] SummaryError),
}

/// A specialized Result type for Rusty-Forum logic.
pub type Result<T> = std::result::Result<T, ForumError>;
