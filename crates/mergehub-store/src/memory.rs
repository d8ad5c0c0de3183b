//! In-memory implementation of the SnapshotStore trait.
//!
//! Same semantics as SQLite, nothing persisted. Used by tests and fixtures.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use mergehub_core::{SnapshotId, StoreId};

use crate::error::{Result, StoreError};
use crate::traits::{CreateResult, Snapshot, SnapshotMeta, SnapshotStore};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Current pointers.
    pointers: BTreeMap<StoreId, SnapshotId>,

    /// Every snapshot ever written.
    snapshots: HashMap<SnapshotId, Snapshot>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Unavailable(format!("memory store poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Unavailable(format!("memory store poisoned: {e}")))
    }
}

impl MemoryStoreInner {
    fn current(&self, store_id: &StoreId) -> Option<&Snapshot> {
        self.pointers
            .get(store_id)
            .and_then(|id| self.snapshots.get(id))
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn create_store(&self, store_id: &StoreId, content: &[u8]) -> Result<CreateResult> {
        let mut inner = self.write()?;

        if inner.pointers.contains_key(store_id) {
            return Ok(CreateResult::AlreadyExists);
        }

        let snapshot = Snapshot::new(store_id.clone(), content, crate::now_millis());
        let meta = snapshot.meta.clone();
        inner.pointers.insert(store_id.clone(), meta.id);
        inner.snapshots.insert(meta.id, snapshot);

        Ok(CreateResult::Created(meta))
    }

    async fn commit(
        &self,
        store_id: &StoreId,
        expected: SnapshotId,
        content: &[u8],
    ) -> Result<SnapshotMeta> {
        let mut inner = self.write()?;

        let actual = *inner
            .pointers
            .get(store_id)
            .ok_or_else(|| StoreError::NotFound(store_id.clone()))?;
        if actual != expected {
            return Err(StoreError::Conflict {
                store_id: store_id.clone(),
                expected,
                actual,
            });
        }

        let snapshot = Snapshot::new(store_id.clone(), content, crate::now_millis());
        let meta = snapshot.meta.clone();
        inner.pointers.insert(store_id.clone(), meta.id);
        inner.snapshots.insert(meta.id, snapshot);

        Ok(meta)
    }

    async fn current(&self, store_id: &StoreId) -> Result<Option<Snapshot>> {
        Ok(self.read()?.current(store_id).cloned())
    }

    async fn list_current(&self) -> Result<Vec<Snapshot>> {
        let inner = self.read()?;
        Ok(inner
            .pointers
            .keys()
            .filter_map(|id| inner.current(id).cloned())
            .collect())
    }

    async fn list_stores(&self) -> Result<Vec<StoreId>> {
        Ok(self.read()?.pointers.keys().cloned().collect())
    }

    async fn get_snapshot(&self, id: SnapshotId) -> Result<Option<Snapshot>> {
        Ok(self.read()?.snapshots.get(&id).cloned())
    }

    async fn history(&self, store_id: &StoreId) -> Result<Vec<SnapshotMeta>> {
        let inner = self.read()?;
        let mut metas: Vec<SnapshotMeta> = inner
            .snapshots
            .values()
            .filter(|s| &s.meta.store_id == store_id)
            .map(|s| s.meta.clone())
            .collect();
        metas.sort_by_key(|m| m.id);
        Ok(metas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStore::new();
        let id = StoreId::new("default").unwrap();

        let CreateResult::Created(v1) = store.create_store(&id, b"v1").await.unwrap() else {
            panic!("expected create");
        };
        let v2 = store.commit(&id, v1.id, b"v2").await.unwrap();

        let current = store.current(&id).await.unwrap().unwrap();
        assert_eq!(current.meta.id, v2.id);
        assert_eq!(store.history(&id).await.unwrap().len(), 2);
        assert_eq!(store.list_stores().await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_memory_store_conflict() {
        let store = MemoryStore::new();
        let id = StoreId::new("default").unwrap();

        let CreateResult::Created(v1) = store.create_store(&id, b"v1").await.unwrap() else {
            panic!("expected create");
        };
        store.commit(&id, v1.id, b"v2").await.unwrap();

        assert!(matches!(
            store.commit(&id, v1.id, b"v3").await,
            Err(StoreError::Conflict { .. })
        ));
        assert_eq!(
            store.create_store(&id, b"again").await.unwrap(),
            CreateResult::AlreadyExists
        );
        assert_eq!(store.history(&id).await.unwrap().len(), 2);
    }

    mod props {
        use super::*;
        use mergehub_core::ContentDigest;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn history_follows_commit_order(
                contents in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..8)
            ) {
                let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
                rt.block_on(async {
                    let store = MemoryStore::new();
                    let id = StoreId::default_store();
                    let CreateResult::Created(mut head) =
                        store.create_store(&id, b"seed").await.unwrap()
                    else {
                        panic!("expected create");
                    };
                    for content in &contents {
                        head = store.commit(&id, head.id, content).await.unwrap();
                    }

                    let history = store.history(&id).await.unwrap();
                    assert_eq!(history.len(), contents.len() + 1);
                    assert!(history.windows(2).all(|w| w[0].id < w[1].id));

                    let current = store.current(&id).await.unwrap().unwrap();
                    let last = contents.last().unwrap();
                    assert_eq!(current.meta.id, head.id);
                    assert_eq!(&current.content[..], &last[..]);
                    assert_eq!(current.meta.digest, ContentDigest::of(last));
                    assert_eq!(current.meta.size, last.len() as u64);
                });
            }
        }
    }
}
