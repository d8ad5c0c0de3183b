//! The replica engine contract.
//!
//! Everything above this crate treats a replica as an opaque, mergeable
//! document. The operations here are the full set the store cache and the
//! sync sessions rely on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;

/// A local edit applied to the root map of a replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    /// Set a key to a text value.
    Put { key: String, value: String },
    /// Set a key to a fresh counter holding `value`.
    SetCounter { key: String, value: i64 },
    /// Add `by` to a counter. A missing key becomes a counter holding `by`.
    Increment { key: String, by: i64 },
}

impl Mutation {
    pub fn increment(key: impl Into<String>, by: i64) -> Self {
        Self::Increment { key: key.into(), by }
    }

    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::SetCounter { key, .. } | Self::Increment { key, .. } => {
                key
            }
        }
    }
}

/// A root-level value as seen by inspection tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Counter(i64),
    Int(i64),
    Text(String),
    Bool(bool),
    /// Anything else, rendered for display.
    Other(String),
}

impl FieldValue {
    /// Numeric value of a counter or integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Counter(n) | Self::Int(n) => Some(*n),
            _ => None,
        }
    }
}

/// A CRDT document that can be persisted, forked, mutated and synced.
///
/// Implementations must merge commutatively and idempotently: receiving the
/// same change twice, or changes in any order, yields the same state.
///
/// Heads are rendered as lowercase hex strings so that callers can compare
/// and persist them without knowing the engine's hash type.
pub trait Replica: Send + Sized + 'static {
    /// Per-peer sync progress.
    type SyncState: Send + 'static;

    /// An empty replica.
    fn empty() -> Self;

    /// Deserialize a replica from saved bytes.
    fn load(bytes: &[u8]) -> Result<Self>;

    /// Serialize the full replica.
    fn save(&self) -> Vec<u8>;

    /// The current frontier of the change graph, sorted.
    fn heads(&self) -> Vec<String>;

    /// An independent copy sharing no mutable state.
    fn fork(&self) -> Self;

    /// An independent copy as of the given heads.
    fn fork_at(&self, heads: &[String]) -> Result<Self>;

    /// Apply a local mutation.
    fn apply(&mut self, mutation: &Mutation) -> Result<()>;

    /// All root-level keys with their values.
    fn values(&self) -> Result<BTreeMap<String, FieldValue>>;

    /// Numeric value of a root-level counter or integer, if present.
    fn counter(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.values()?.get(key).and_then(FieldValue::as_i64))
    }

    /// Sync state for a peer we know nothing about.
    fn new_sync_state(&self) -> Self::SyncState;

    /// Decode sync state previously produced by [`Replica::save_sync_state`].
    fn load_sync_state(&self, bytes: &[u8]) -> Result<Self::SyncState>;

    /// Encode sync state for persistence or hand-off.
    fn save_sync_state(&self, state: &Self::SyncState) -> Vec<u8>;

    /// The next message for the peer, or `None` when there is nothing to send.
    fn generate_message(&self, state: &mut Self::SyncState) -> Option<Vec<u8>>;

    /// Apply a message from the peer.
    fn receive_message(&mut self, state: &mut Self::SyncState, message: &[u8]) -> Result<()>;
}
