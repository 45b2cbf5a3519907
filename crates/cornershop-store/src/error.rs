//! Error types for the store module.

use cornershop_core::ValidationError;
use thiserror::Error;

/// Errors that can occur during store operations.
///
/// The first four variants are the failure classes every adapter must be able
/// to surface; the rest are adapter-specific causes.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection or transport failure, including per-call timeouts.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The addressed product or sale does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Concurrent modification detected by the adapter.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Stored or supplied data is malformed.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A stock adjustment would take a product below zero.
    #[error("insufficient stock for {name}: available {available}, requested {requested}")]
    InsufficientStock {
        name: String,
        available: i64,
        requested: i64,
    },

    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Document serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Whether the error means the target changed underneath the caller.
    ///
    /// `InsufficientStock` counts: stock computed from an earlier read was
    /// taken by a sale that landed since.
    pub fn is_concurrent_change(&self) -> bool {
        matches!(
            self,
            StoreError::Conflict(_) | StoreError::NotFound(_) | StoreError::InsufficientStock { .. }
        )
    }
}

impl From<ValidationError> for StoreError {
    fn from(e: ValidationError) -> Self {
        StoreError::InvalidData(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
