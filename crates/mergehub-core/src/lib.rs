//! # mergehub core
//!
//! Pure primitives for mergehub: the replica engine contract, the Automerge
//! engine behind it, and the identifier types every other crate speaks.
//!
//! This crate does no I/O and holds no locks. It is computation over
//! documents and the byte encodings that move between peers.
//!
//! ## Key Types
//!
//! - [`Replica`] - The capability set the sync core needs from a CRDT engine
//! - [`AutomergeReplica`] - The default engine, backed by `automerge`
//! - [`StoreId`] - Names one logical shared document
//! - [`SnapshotId`] - Time-ordered identifier of a persisted snapshot
//! - [`Cookie`] - Opaque resumable sync state held by the remote caller
//! - [`ContentDigest`] - Blake3 digest of serialized replica content
//!
//! ## Engine Contract
//!
//! The sync session and the store cache never look inside a replica. They
//! load, save, fork, mutate and exchange opaque sync messages through the
//! [`Replica`] trait, so any engine with commutative, idempotent merges can
//! stand in for Automerge.

pub mod b64;
pub mod cookie;
pub mod digest;
pub mod engine;
pub mod error;
pub mod replica;
pub mod types;

pub use cookie::Cookie;
pub use digest::ContentDigest;
pub use engine::AutomergeReplica;
pub use error::{CoreError, ReplicaError, Result};
pub use replica::{FieldValue, Mutation, Replica};
pub use types::{SnapshotId, StoreId, MAX_STORE_ID_LEN};
