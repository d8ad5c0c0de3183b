//! # mergehub store
//!
//! Snapshot persistence for mergehub. A store id names one lineage of
//! immutable serialized replicas plus a current pointer into it.
//!
//! ## Key Types
//!
//! - [`SnapshotStore`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`Snapshot`] / [`SnapshotMeta`] - An immutable serialized replica
//! - [`CreateResult`] - Result of registering a store
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mergehub_core::StoreId;
//! use mergehub_store::{CreateResult, SnapshotStore, SqliteStore};
//!
//! async fn example() -> mergehub_store::Result<()> {
//!     let store = SqliteStore::open("mergehub.db")?;
//!     let id = StoreId::default_store();
//!
//!     if let CreateResult::Created(first) = store.create_store(&id, b"...").await? {
//!         // Repoint only if nobody else moved the pointer since `first`.
//!         store.commit(&id, first.id, b"...").await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Append-only**: snapshots are never updated or deleted
//! - **Atomic repoint**: snapshot insert and pointer move share a transaction
//! - **Compare-and-swap**: a stale writer gets `Conflict`, never a lost update

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{CreateResult, Snapshot, SnapshotMeta, SnapshotStore, StoreExt};

/// Current wall-clock time in Unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
