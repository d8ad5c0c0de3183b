//! Error types for the hub and the client.

use mergehub_core::{ReplicaError, StoreId};
use mergehub_store::StoreError;
use mergehub_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during hub operations.
#[derive(Debug, Error)]
pub enum HubError {
    /// No store with this id is cached.
    #[error("store not found: {0}")]
    NotFound(StoreId),

    /// A store with this id already exists.
    #[error("store already exists: {0}")]
    AlreadyExists(StoreId),

    /// Replica engine error.
    #[error("replica error: {0}")]
    Replica(#[from] ReplicaError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// A persisted snapshot did not load.
    #[error("snapshot for store {store_id} is unreadable: {source}")]
    CorruptSnapshot {
        store_id: StoreId,
        source: ReplicaError,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<HubError> for SyncError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::Sync(err) => err,
            HubError::Store(err) => SyncError::Store(err),
            HubError::Replica(err) => err.into(),
            HubError::NotFound(store_id) => SyncError::NotFound(store_id),
            other => SyncError::Transport(other.to_string()),
        }
    }
}

/// Result type for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;

/// Errors raised by the HTTP/WebSocket client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The server answered with an unexpected status.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    #[error("replica error: {0}")]
    Replica(#[from] ReplicaError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
