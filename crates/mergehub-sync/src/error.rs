//! Error types for the sync module.

use mergehub_core::{ReplicaError, StoreId};
use thiserror::Error;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The request broke the session protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The cookie could not be decoded.
    #[error("invalid cookie: {0}")]
    InvalidCookie(String),

    /// A sync message could not be decoded or applied.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The replica engine rejected an operation.
    #[error("replica error: {0}")]
    Replica(ReplicaError),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] mergehub_store::StoreError),

    /// The remote side does not know this store.
    #[error("store not found: {0}")]
    NotFound(StoreId),

    /// Local encoding failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,
}

impl From<ReplicaError> for SyncError {
    fn from(err: ReplicaError) -> Self {
        match err {
            ReplicaError::InvalidCookie(msg) => Self::InvalidCookie(msg),
            ReplicaError::InvalidMessage(msg) => Self::InvalidMessage(msg),
            other => Self::Replica(other),
        }
    }
}

impl SyncError {
    /// Whether the caller sent something malformed, as opposed to a failure
    /// on this side.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::ProtocolViolation(_) | Self::InvalidCookie(_) | Self::InvalidMessage(_)
        )
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
