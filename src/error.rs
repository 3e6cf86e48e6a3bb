//! Error types for Roost
//!
//! All errors in the engine are converted to `EngineError`. Mediators and
//! loaders never let an error escape their contract boundary as a panic;
//! they return it so the paging engine can hold it as per-feed state.

use thiserror::Error;

/// Engine-wide error type
///
/// This enum represents all possible errors that can occur while
/// synchronizing or mutating cached content. `Auth` is the only kind a
/// caller is expected to propagate further, for re-authentication flows.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Network-level failure (connect, timeout, TLS)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Backend returned a malformed or unexpected payload
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Credentials rejected by the backend (401/403)
    #[error("Authentication required")]
    Auth,

    /// Entity deleted or never existed upstream (404)
    #[error("Resource not found")]
    NotFound,

    /// Feature not available on this backend
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Cache store error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Content blob encode/decode error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Fetch cancelled by the owning scope before commit
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal engine error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    /// Classify an HTTP client error into the engine taxonomy.
    ///
    /// Status codes map onto `Auth`/`NotFound`, connection and timeout
    /// failures onto `Transport`, body decode failures onto `Protocol`.
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return match status.as_u16() {
                401 | 403 => EngineError::Auth,
                404 => EngineError::NotFound,
                _ => EngineError::Transport(err.to_string()),
            };
        }
        if err.is_decode() {
            EngineError::Protocol(err.to_string())
        } else {
            EngineError::Transport(err.to_string())
        }
    }
}

impl EngineError {
    /// Stable label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Transport(_) => "transport",
            EngineError::Protocol(_) => "protocol",
            EngineError::Auth => "auth",
            EngineError::NotFound => "not_found",
            EngineError::Unsupported(_) => "unsupported",
            EngineError::Database(_) => "database",
            EngineError::Serialization(_) => "serialization",
            EngineError::Config(_) => "config",
            EngineError::Cancelled => "cancelled",
            EngineError::Internal(_) => "internal",
        }
    }

    /// Whether re-issuing the same request may succeed.
    ///
    /// Used by callers to decide between a retry affordance and a
    /// permanent failure state.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Transport(_) | EngineError::Database(_) | EngineError::Cancelled
        )
    }
}

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;
