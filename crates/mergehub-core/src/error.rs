//! Error types for mergehub core.

use thiserror::Error;

/// Errors raised by a replica engine.
///
/// Every variant is a decode or mutation failure for one operation; none of
/// them leave the replica half-modified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplicaError {
    /// Serialized replica content could not be loaded.
    #[error("invalid replica format: {0}")]
    InvalidFormat(String),

    /// A cookie did not decode into sync state.
    #[error("invalid cookie: {0}")]
    InvalidCookie(String),

    /// A sync message did not decode or could not be applied.
    #[error("invalid sync message: {0}")]
    InvalidMessage(String),

    /// A local mutation was rejected by the engine.
    #[error("mutation failed: {0}")]
    Mutation(String),
}

/// Errors for identifier parsing and validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("store id must not be empty")]
    EmptyStoreId,

    #[error("store id exceeds {max} characters: {len}")]
    StoreIdTooLong { len: usize, max: usize },

    #[error("store id contains invalid character {0:?}")]
    InvalidStoreIdChar(char),

    #[error("invalid snapshot id: {0}")]
    InvalidSnapshotId(String),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),
}

/// Result type for replica engine operations.
pub type Result<T> = std::result::Result<T, ReplicaError>;
