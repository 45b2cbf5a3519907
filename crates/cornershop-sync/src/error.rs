//! Error types for the sync module.

use cornershop_core::{Backend, EntityKind};
use cornershop_store::StoreError;
use thiserror::Error;

/// Errors that can occur during sync operations.
///
/// Only [`SyncError::FatalUnavailable`] and [`SyncError::Config`] abort a
/// pass. The other variants describe individual outcomes and show up in the
/// report through [`crate::report::ConflictDescriptor::to_error`] or as the
/// cause of a failure.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A store stayed unreachable after the configured retries.
    #[error("{backend} unavailable: {source}")]
    TransientStore {
        backend: Backend,
        #[source]
        source: StoreError,
    },

    /// A concurrent change was still in the way after one recovery attempt.
    #[error("data conflict on {kind} {identity}: {reason}")]
    DataConflict {
        kind: EntityKind,
        identity: String,
        reason: String,
    },

    /// The stores disagree in a way no merge policy may resolve.
    #[error("semantic conflict on {kind} {identity}: {reason}")]
    SemanticConflict {
        kind: EntityKind,
        identity: String,
        reason: String,
    },

    /// Neither store could be reached.
    #[error("both stores unavailable (document: {document}; relational: {relational})")]
    FatalUnavailable { document: String, relational: String },

    /// A store operation failed for a non-transient reason.
    #[error("{backend} error: {source}")]
    Store {
        backend: Backend,
        #[source]
        source: StoreError,
    },

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// The engine was configured with unusable settings.
    #[error("invalid sync configuration: {0}")]
    Config(String),
}

impl SyncError {
    /// Classify a store error raised by `backend`.
    pub fn from_store(backend: Backend, source: StoreError) -> Self {
        if source.is_transient() {
            SyncError::TransientStore { backend, source }
        } else {
            SyncError::Store { backend, source }
        }
    }

    /// Whether this error came from an unreachable store.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            SyncError::TransientStore { .. } | SyncError::FatalUnavailable { .. }
        )
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
