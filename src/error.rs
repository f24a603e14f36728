//! Error types for Edgeline
//!
//! One crate-wide error enum covers the translation, backend, configuration
//! and management failure domains. Translation errors additionally travel
//! through the storage layer's out-of-band error channel, keyed by the
//! operation that raised them (see [`crate::storage::SqliteStorage::last_error`]).

use thiserror::Error;

/// Result type alias for Edgeline operations
pub type Result<T> = std::result::Result<T, EdgelineError>;

/// Main error type for Edgeline
#[derive(Error, Debug)]
pub enum EdgelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A malformed query descriptor. Reported against the operation that
    /// attempted the translation; has no side effect on storage.
    #[error("{operation}: {reason}")]
    Translation {
        operation: &'static str,
        reason: String,
    },

    /// The SQL backend rejected a statement. Carries the backend's own
    /// message; the failed operation is not retried.
    #[error("backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("management error: {0}")]
    Management(String),

    #[error("filter error: {0}")]
    Filter(String),
}

impl EdgelineError {
    /// Build a translation error for the named operation.
    pub fn translation(operation: &'static str, reason: impl Into<String>) -> Self {
        EdgelineError::Translation {
            operation,
            reason: reason.into(),
        }
    }
}

impl From<rusqlite::Error> for EdgelineError {
    fn from(err: rusqlite::Error) -> Self {
        EdgelineError::Backend(err.to_string())
    }
}
