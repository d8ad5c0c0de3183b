//! Fault injection for store failures.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use mergehub_core::{SnapshotId, StoreId};
use mergehub_store::{CreateResult, Result, Snapshot, SnapshotMeta, SnapshotStore, StoreError};

/// Wraps a store and fails the next N commits with `Unavailable`.
///
/// A failed commit never reaches the inner store, matching a transaction
/// that rolled back.
pub struct FlakyStore<S> {
    inner: S,
    fail_commits: AtomicUsize,
    commits: AtomicUsize,
    failures: AtomicUsize,
}

impl<S> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_commits: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    /// Fail the next `n` commits.
    pub fn fail_next_commits(&self, n: usize) {
        self.fail_commits.store(n, Ordering::SeqCst);
    }

    /// Commits that reached the inner store.
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Commits rejected by injection.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn take_failure(&self) -> bool {
        self.fail_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl<S: SnapshotStore> SnapshotStore for FlakyStore<S> {
    async fn create_store(&self, store_id: &StoreId, content: &[u8]) -> Result<CreateResult> {
        self.inner.create_store(store_id, content).await
    }

    async fn commit(
        &self,
        store_id: &StoreId,
        expected: SnapshotId,
        content: &[u8],
    ) -> Result<SnapshotMeta> {
        if self.take_failure() {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("injected commit failure".into()));
        }
        let meta = self.inner.commit(store_id, expected, content).await?;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(meta)
    }

    async fn current(&self, store_id: &StoreId) -> Result<Option<Snapshot>> {
        self.inner.current(store_id).await
    }

    async fn list_current(&self) -> Result<Vec<Snapshot>> {
        self.inner.list_current().await
    }

    async fn list_stores(&self) -> Result<Vec<StoreId>> {
        self.inner.list_stores().await
    }

    async fn get_snapshot(&self, id: SnapshotId) -> Result<Option<Snapshot>> {
        self.inner.get_snapshot(id).await
    }

    async fn history(&self, store_id: &StoreId) -> Result<Vec<SnapshotMeta>> {
        self.inner.history(store_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mergehub_store::MemoryStore;

    #[tokio::test]
    async fn test_fails_exactly_n_commits() {
        let store = FlakyStore::new(MemoryStore::new());
        let id = StoreId::default_store();
        let CreateResult::Created(meta) = store.create_store(&id, b"v1").await.unwrap() else {
            panic!("expected a new store");
        };

        store.fail_next_commits(2);
        assert!(matches!(
            store.commit(&id, meta.id, b"v2").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.commit(&id, meta.id, b"v2").await.is_err());
        let next = store.commit(&id, meta.id, b"v2").await.unwrap();

        assert_eq!(store.failures(), 2);
        assert_eq!(store.commits(), 1);
        assert_eq!(store.current(&id).await.unwrap().unwrap().meta.id, next.id);
        assert_eq!(store.history(&id).await.unwrap().len(), 2);
    }
}
