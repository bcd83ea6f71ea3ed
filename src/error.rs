//! Error types for the rate-limited chat-completions service.
//!
//! Five distinct, observable kinds, one `thiserror` enum per layer, matching
//! the teacher library's `RateLimitError`/`StorageError`/`ConnectionError`
//! split but narrowed to what this service actually produces.

use std::time::Duration;

use thiserror::Error;

use crate::limiter::Dimension;

/// Result type used throughout the limiter core.
pub type Result<T> = std::result::Result<T, LimiterError>;

/// The five distinct, observable error kinds the system can produce.
#[derive(Debug, Error)]
pub enum LimiterError {
    /// Malformed body or missing auth header.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Auth header present but not in the credential registry.
    #[error("unknown credential")]
    UnknownCredential,

    /// Admission was denied on one dimension.
    #[error("rate limited on {dimension}, retry after {retry_after_ms}ms")]
    RateLimited {
        dimension: Dimension,
        retry_after_ms: u64,
    },

    /// Redis was unreachable or the call exceeded its deadline.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// The admission/reconcile script returned something unexpected, or any
    /// other unclassified fault.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Storage/connection-layer errors. Kept distinct from [`LimiterError`] so
/// `try_admit`/`reconcile_output` can classify the failure before folding it
/// into the coarser kind the HTTP layer maps to a status code.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to acquire a pooled connection: {0}")]
    PoolExhausted(String),

    #[error("redis command failed: {0}")]
    Command(String),

    #[error("admission call exceeded its {0:?} deadline")]
    Timeout(Duration),
}

/// Startup configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnv { var: &'static str, reason: String },

    #[error("failed to read credentials file {path}: {source}")]
    CredentialsFileUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse credentials file {path}: {source}")]
    CredentialsFileInvalid {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}
