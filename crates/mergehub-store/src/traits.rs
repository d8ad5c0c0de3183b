//! SnapshotStore trait: the abstract interface for snapshot persistence.
//!
//! Snapshots are append-only. The only mutable record per store is its
//! current pointer, and the pointer only moves by compare-and-swap.

use async_trait::async_trait;
use bytes::Bytes;
use mergehub_core::{ContentDigest, SnapshotId, StoreId};

use crate::error::Result;

/// Everything about a snapshot except its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotMeta {
    pub id: SnapshotId,
    pub store_id: StoreId,
    pub digest: ContentDigest,
    /// Content length in bytes.
    pub size: u64,
    /// Wall-clock creation time (Unix ms).
    pub created_at: i64,
}

/// An immutable serialized replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub content: Bytes,
}

impl Snapshot {
    /// Build a fresh snapshot for `content` with a newly issued id.
    pub fn new(store_id: StoreId, content: &[u8], created_at: i64) -> Self {
        Self {
            meta: SnapshotMeta {
                id: SnapshotId::generate(),
                store_id,
                digest: ContentDigest::of(content),
                size: content.len() as u64,
                created_at,
            },
            content: Bytes::copy_from_slice(content),
        }
    }

    pub fn id(&self) -> SnapshotId {
        self.meta.id
    }
}

/// Result of registering a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateResult {
    /// The store was registered with this initial snapshot.
    Created(SnapshotMeta),
    /// A store with this id already exists; nothing was written.
    AlreadyExists,
}

/// The SnapshotStore trait: async interface for snapshot persistence.
///
/// # Design Notes
///
/// - **Append-only**: Snapshots are inserted, never updated or deleted.
/// - **Atomic repoint**: `commit` inserts the snapshot and moves the pointer
///   in one transaction. On any error neither is visible.
/// - **Compare-and-swap**: `commit` fails with `Conflict` if the pointer no
///   longer names `expected`.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Pointer Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a store whose first snapshot holds `content`.
    async fn create_store(&self, store_id: &StoreId, content: &[u8]) -> Result<CreateResult>;

    /// Insert a snapshot of `content` and repoint `store_id` from `expected`
    /// to it.
    async fn commit(
        &self,
        store_id: &StoreId,
        expected: SnapshotId,
        content: &[u8],
    ) -> Result<SnapshotMeta>;

    /// The snapshot the store's pointer names.
    async fn current(&self, store_id: &StoreId) -> Result<Option<Snapshot>>;

    /// The current snapshot of every registered store, ordered by store id.
    async fn list_current(&self) -> Result<Vec<Snapshot>>;

    /// Ids of every registered store, sorted.
    async fn list_stores(&self) -> Result<Vec<StoreId>>;

    // ─────────────────────────────────────────────────────────────────────────
    // History
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a snapshot by id.
    async fn get_snapshot(&self, id: SnapshotId) -> Result<Option<Snapshot>>;

    /// Every snapshot of a store, oldest first.
    async fn history(&self, store_id: &StoreId) -> Result<Vec<SnapshotMeta>>;
}

/// Extension trait for common store patterns.
pub trait StoreExt: SnapshotStore {
    /// Register the store with `seed` if it is missing, then return its
    /// current snapshot.
    fn ensure_store(
        &self,
        store_id: &StoreId,
        seed: &[u8],
    ) -> impl std::future::Future<Output = Result<Snapshot>> + Send;

    /// Commit `content` only when its digest differs from `previous`.
    ///
    /// Returns `None` when nothing was written.
    fn commit_if_changed(
        &self,
        store_id: &StoreId,
        expected: SnapshotId,
        previous: &ContentDigest,
        content: &[u8],
    ) -> impl std::future::Future<Output = Result<Option<SnapshotMeta>>> + Send;
}

impl<S: SnapshotStore + ?Sized> StoreExt for S {
    async fn ensure_store(&self, store_id: &StoreId, seed: &[u8]) -> Result<Snapshot> {
        if let CreateResult::Created(meta) = self.create_store(store_id, seed).await? {
            tracing::info!(store = %store_id, snapshot = %meta.id, "seeded store");
        }

        // A concurrent create may have won.
        self.current(store_id)
            .await?
            .ok_or_else(|| crate::StoreError::NotFound(store_id.clone()))
    }

    async fn commit_if_changed(
        &self,
        store_id: &StoreId,
        expected: SnapshotId,
        previous: &ContentDigest,
        content: &[u8],
    ) -> Result<Option<SnapshotMeta>> {
        if ContentDigest::of(content) == *previous {
            return Ok(None);
        }
        self.commit(store_id, expected, content).await.map(Some)
    }
}
