//! Error types for the store module.

use mergehub_core::{SnapshotId, StoreId};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No store with this id is registered.
    #[error("store not found: {0}")]
    NotFound(StoreId),

    /// The current pointer moved since the caller last read it.
    #[error("conflict on store {store_id}: expected snapshot {expected}, found {actual}")]
    Conflict {
        store_id: StoreId,
        expected: SnapshotId,
        actual: SnapshotId,
    },

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend could not run the operation at all.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
