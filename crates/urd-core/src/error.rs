//! Error types for record and state storage operations.

use thiserror::Error;

use crate::models::RecordId;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for record source and state store operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Filesystem operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path the operation was acting on
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Record content could not be read or interpreted.
    #[error("invalid record {id}: {message}")]
    InvalidRecord {
        /// Identifier of the offending record
        id: RecordId,
        /// What went wrong
        message: String,
    },

    /// Record not present in active storage.
    #[error("record {id} not found")]
    NotFound {
        /// Identifier that was looked up
        id: RecordId,
    },

    /// Delivery state could not be persisted.
    ///
    /// Persistence failures must never silently drop a delivery
    /// confirmation, so callers treat this as fatal for the record's update.
    #[error("state store error for {id}: {message}")]
    State {
        /// Record whose state entry was being mutated
        id: RecordId,
        /// What went wrong
        message: String,
    },
}

impl CoreError {
    /// Creates an I/O error with path context.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// Creates an invalid-record error.
    pub fn invalid_record(id: RecordId, message: impl Into<String>) -> Self {
        Self::InvalidRecord { id, message: message.into() }
    }

    /// Creates a not-found error.
    pub fn not_found(id: RecordId) -> Self {
        Self::NotFound { id }
    }

    /// Creates a state persistence error.
    pub fn state(id: RecordId, message: impl Into<String>) -> Self {
        Self::State { id, message: message.into() }
    }
}
