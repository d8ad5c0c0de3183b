//! The Hub: the server's store cache.
//!
//! One entry per store id, each holding the live replica behind its own lock
//! plus a mark of what was last made durable. Entries are created on open
//! and by [`Hub::create`]; they are never evicted.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use mergehub_core::{AutomergeReplica, ContentDigest, FieldValue, Replica, SnapshotId, StoreId};
use mergehub_store::{CreateResult, SnapshotMeta, SnapshotStore, StoreExt};
use mergehub_sync::{
    run_round, ReplicaHandle, RoundTransport, SyncError, SyncRequest, SyncResponse,
};
use tokio::sync::{Mutex, RwLock};

use crate::config::HubConfig;
use crate::error::{HubError, Result};

/// What the store last acknowledged for an entry.
#[derive(Debug, Clone, Copy)]
struct DurableMark {
    snapshot: SnapshotId,
    digest: ContentDigest,
}

struct Entry<R> {
    handle: ReplicaHandle<R>,
    durable: Mutex<DurableMark>,
}

impl<R: Replica> Entry<R> {
    fn new(replica: R, snapshot: SnapshotId, digest: ContentDigest) -> Self {
        Self {
            handle: ReplicaHandle::new(replica),
            durable: Mutex::new(DurableMark { snapshot, digest }),
        }
    }
}

/// Result of a backup sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupReport {
    /// Stores whose content changed and was committed.
    pub written: Vec<StoreId>,
    pub unchanged: usize,
    /// Stores whose commit failed; retried on the next sweep.
    pub failed: Vec<StoreId>,
}

/// The store cache.
///
/// Lock order within an entry is replica, then durable mark. Different
/// entries share no lock, so sessions on different stores never contend.
pub struct Hub<S, R = AutomergeReplica> {
    store: Arc<S>,
    entries: RwLock<HashMap<StoreId, Arc<Entry<R>>>>,
    config: HubConfig,
}

impl<S, R> Hub<S, R>
where
    S: SnapshotStore + 'static,
    R: Replica,
{
    /// Seed the configured stores, then load every known store.
    pub async fn open(store: Arc<S>, config: HubConfig) -> Result<Self> {
        let seed = R::empty().save();
        for store_id in &config.seed_stores {
            store.ensure_store(store_id, &seed).await?;
        }

        let mut entries = HashMap::new();
        for snapshot in store.list_current().await? {
            let store_id = snapshot.meta.store_id.clone();
            let replica = R::load(&snapshot.content).map_err(|source| {
                HubError::CorruptSnapshot {
                    store_id: store_id.clone(),
                    source,
                }
            })?;
            let digest = ContentDigest::of(&replica.save());
            tracing::debug!(
                store = %store_id,
                snapshot = %snapshot.meta.id,
                heads = ?replica.heads(),
                "loaded store"
            );
            entries.insert(
                store_id,
                Arc::new(Entry::new(replica, snapshot.meta.id, digest)),
            );
        }

        tracing::info!(stores = entries.len(), "hub opened");
        Ok(Self {
            store,
            entries: RwLock::new(entries),
            config,
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    async fn entry(&self, store_id: &StoreId) -> Result<Arc<Entry<R>>> {
        self.entries
            .read()
            .await
            .get(store_id)
            .cloned()
            .ok_or_else(|| HubError::NotFound(store_id.clone()))
    }

    /// The live replica of a store.
    pub async fn get(&self, store_id: &StoreId) -> Result<ReplicaHandle<R>> {
        Ok(self.entry(store_id).await?.handle.clone())
    }

    /// Serialized copy of a store's replica.
    pub async fn fork(&self, store_id: &StoreId) -> Result<Vec<u8>> {
        Ok(self.entry(store_id).await?.handle.save().await)
    }

    /// Run `f` with exclusive access to a store's replica.
    pub async fn with_exclusive<T>(
        &self,
        store_id: &StoreId,
        f: impl FnOnce(&mut R) -> T,
    ) -> Result<T> {
        let entry = self.entry(store_id).await?;
        Ok(entry.handle.with_exclusive(f).await)
    }

    /// Register a new store from uploaded content, or empty if none.
    pub async fn create(&self, store_id: StoreId, content: Option<&[u8]>) -> Result<SnapshotMeta> {
        let replica = match content {
            Some(bytes) if !bytes.is_empty() => R::load(bytes)?,
            _ => R::empty(),
        };
        let bytes = replica.save();

        if self.entries.read().await.contains_key(&store_id) {
            return Err(HubError::AlreadyExists(store_id));
        }

        // The store arbitrates concurrent creates; only the winner inserts.
        match self.store.create_store(&store_id, &bytes).await? {
            CreateResult::Created(meta) => {
                tracing::info!(store = %store_id, snapshot = %meta.id, size = meta.size, "created store");
                self.entries.write().await.insert(
                    store_id,
                    Arc::new(Entry::new(replica, meta.id, meta.digest)),
                );
                Ok(meta)
            }
            CreateResult::AlreadyExists => Err(HubError::AlreadyExists(store_id)),
        }
    }

    pub async fn heads(&self, store_id: &StoreId) -> Result<Vec<String>> {
        Ok(self.entry(store_id).await?.handle.heads().await)
    }

    pub async fn values(&self, store_id: &StoreId) -> Result<BTreeMap<String, FieldValue>> {
        let entry = self.entry(store_id).await?;
        let values = entry.handle.lock().await.values()?;
        Ok(values)
    }

    /// Ids of every cached store, sorted.
    pub async fn store_ids(&self) -> Vec<StoreId> {
        let mut ids: Vec<StoreId> = self.entries.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Run one resumable round.
    ///
    /// The round runs on a fork of the live replica. A round that moved the
    /// heads replaces the live replica only after the new snapshot is
    /// committed, so a failed commit leaves no trace and the caller may retry
    /// with the same cookie. A round that did not move the heads still
    /// replaces it: the fork may hold changes queued for missing
    /// dependencies, and the peer will not send those again.
    pub async fn sync_round(&self, store_id: &StoreId, request: SyncRequest) -> Result<SyncResponse> {
        let entry = self.entry(store_id).await?;
        let mut live = entry.handle.lock().await;
        let mut durable = entry.durable.lock().await;

        let mut working = live.fork();
        let inbound = request.messages.len();
        let outcome = run_round(&mut working, request, &self.config.round)?;

        if outcome.mutated {
            let content = working.save();
            let meta = self.store.commit(store_id, durable.snapshot, &content).await?;
            *durable = DurableMark {
                snapshot: meta.id,
                digest: meta.digest,
            };
            *live = working;
            tracing::debug!(
                store = %store_id,
                snapshot = %meta.id,
                heads = ?live.heads(),
                "round committed"
            );
        } else {
            *live = working;
        }

        tracing::trace!(
            store = %store_id,
            inbound,
            outbound = outcome.messages.len(),
            mutated = outcome.mutated,
            "resumable round"
        );
        Ok(outcome.into_response())
    }

    /// Commit every store whose content changed since its last durable write.
    ///
    /// Failures are logged and reported, never propagated.
    pub async fn backup_all(&self) -> BackupReport {
        let entries: Vec<(StoreId, Arc<Entry<R>>)> = self
            .entries
            .read()
            .await
            .iter()
            .map(|(id, entry)| (id.clone(), Arc::clone(entry)))
            .collect();

        let mut report = BackupReport::default();
        for (store_id, entry) in entries {
            match self.backup_entry(&store_id, &entry).await {
                Ok(Some(meta)) => {
                    tracing::info!(store = %store_id, snapshot = %meta.id, size = meta.size, "backed up store");
                    report.written.push(store_id);
                }
                Ok(None) => report.unchanged += 1,
                Err(err) => {
                    tracing::warn!(store = %store_id, error = %err, "backup failed");
                    report.failed.push(store_id);
                }
            }
        }
        report
    }

    async fn backup_entry(
        &self,
        store_id: &StoreId,
        entry: &Entry<R>,
    ) -> Result<Option<SnapshotMeta>> {
        let live = entry.handle.lock().await;
        let mut durable = entry.durable.lock().await;
        let content = live.save();
        drop(live);

        let written = self
            .store
            .commit_if_changed(store_id, durable.snapshot, &durable.digest, &content)
            .await?;
        if let Some(meta) = &written {
            *durable = DurableMark {
                snapshot: meta.id,
                digest: meta.digest,
            };
        }
        Ok(written)
    }

    /// Write every replica to `<dir>/<store>.automerge`.
    pub async fn dump_to(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for store_id in self.store_ids().await {
            let content = self.fork(&store_id).await?;
            let path = dir.join(format!("{store_id}.automerge"));
            let target = path.clone();
            tokio::task::spawn_blocking(move || std::fs::write(&target, content))
                .await
                .map_err(|e| HubError::Io(std::io::Error::other(e)))??;
            tracing::info!(store = %store_id, path = %path.display(), "dumped store");
            written.push(path);
        }
        Ok(written)
    }
}

#[async_trait]
impl<S, R> RoundTransport for Hub<S, R>
where
    S: SnapshotStore + 'static,
    R: Replica,
{
    async fn round(
        &self,
        store_id: &StoreId,
        request: SyncRequest,
    ) -> std::result::Result<SyncResponse, SyncError> {
        self.sync_round(store_id, request).await.map_err(SyncError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mergehub_core::Mutation;
    use mergehub_store::MemoryStore;
    use mergehub_sync::ResumablePeer;

    async fn hub() -> Hub<MemoryStore> {
        Hub::open(Arc::new(MemoryStore::new()), HubConfig::default())
            .await
            .unwrap()
    }

    fn default_id() -> StoreId {
        StoreId::default_store()
    }

    #[tokio::test]
    async fn test_open_seeds_default_store() {
        let hub = hub().await;
        assert_eq!(hub.store_ids().await, vec![default_id()]);
        assert!(hub.heads(&default_id()).await.unwrap().is_empty());
        assert_eq!(hub.store().history(&default_id()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_store_is_not_found() {
        let hub = hub().await;
        let missing = StoreId::new("missing").unwrap();
        assert!(matches!(hub.get(&missing).await, Err(HubError::NotFound(_))));
        assert!(matches!(hub.fork(&missing).await, Err(HubError::NotFound(_))));
        assert!(matches!(
            hub.sync_round(&missing, SyncRequest::bootstrap()).await,
            Err(HubError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_from_content_and_conflict() {
        let hub = hub().await;
        let mut upload = AutomergeReplica::empty();
        upload.apply(&Mutation::increment("counter", 7)).unwrap();

        let id = StoreId::new("notes").unwrap();
        hub.create(id.clone(), Some(&upload.save())).await.unwrap();
        assert_eq!(
            hub.values(&id).await.unwrap()["counter"],
            FieldValue::Counter(7)
        );

        assert!(matches!(
            hub.create(id.clone(), None).await,
            Err(HubError::AlreadyExists(_))
        ));
        assert!(matches!(
            hub.create(StoreId::new("bad").unwrap(), Some(b"garbage")).await,
            Err(HubError::Replica(_))
        ));
    }

    #[tokio::test]
    async fn test_backup_writes_only_changes() {
        let hub = hub().await;
        let id = default_id();

        let report = hub.backup_all().await;
        assert!(report.written.is_empty());
        assert_eq!(report.unchanged, 1);

        hub.with_exclusive(&id, |r| r.apply(&Mutation::increment("counter", 1)))
            .await
            .unwrap()
            .unwrap();
        let report = hub.backup_all().await;
        assert_eq!(report.written, vec![id.clone()]);

        let report = hub.backup_all().await;
        assert!(report.written.is_empty());
        assert_eq!(hub.store().history(&id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_round_commits_only_when_heads_move() {
        let hub = hub().await;
        let id = default_id();
        let handle = ReplicaHandle::new(AutomergeReplica::empty());
        handle.apply(&Mutation::increment("counter", 1)).await.unwrap();

        let mut peer = ResumablePeer::new(&*handle.lock().await);
        let (_, quiet) = peer.sync_until_quiet(&handle, &hub, &id, 10).await.unwrap();
        assert!(quiet);

        let history = hub.store().history(&id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(hub.heads(&id).await.unwrap(), handle.heads().await);

        // Durable content already matches; backup has nothing to do.
        assert!(hub.backup_all().await.written.is_empty());
    }

    /// Holds every `create_store` until released.
    struct GatedStore {
        inner: MemoryStore,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl SnapshotStore for GatedStore {
        async fn create_store(
            &self,
            store_id: &StoreId,
            content: &[u8],
        ) -> mergehub_store::Result<CreateResult> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.create_store(store_id, content).await
        }

        async fn commit(
            &self,
            store_id: &StoreId,
            expected: SnapshotId,
            content: &[u8],
        ) -> mergehub_store::Result<SnapshotMeta> {
            self.inner.commit(store_id, expected, content).await
        }

        async fn current(
            &self,
            store_id: &StoreId,
        ) -> mergehub_store::Result<Option<mergehub_store::Snapshot>> {
            self.inner.current(store_id).await
        }

        async fn list_current(&self) -> mergehub_store::Result<Vec<mergehub_store::Snapshot>> {
            self.inner.list_current().await
        }

        async fn list_stores(&self) -> mergehub_store::Result<Vec<StoreId>> {
            self.inner.list_stores().await
        }

        async fn get_snapshot(
            &self,
            id: SnapshotId,
        ) -> mergehub_store::Result<Option<mergehub_store::Snapshot>> {
            self.inner.get_snapshot(id).await
        }

        async fn history(&self, store_id: &StoreId) -> mergehub_store::Result<Vec<SnapshotMeta>> {
            self.inner.history(store_id).await
        }
    }

    #[tokio::test]
    async fn test_pending_create_does_not_block_other_stores() {
        let memory = MemoryStore::new();
        memory
            .create_store(&default_id(), &AutomergeReplica::empty().save())
            .await
            .unwrap();
        let store = Arc::new(GatedStore {
            inner: memory,
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let config = HubConfig {
            seed_stores: vec![],
            ..HubConfig::default()
        };
        let hub = Arc::new(Hub::<_, AutomergeReplica>::open(Arc::clone(&store), config).await.unwrap());

        let other: StoreId = "other".parse().unwrap();
        let creating = {
            let hub = Arc::clone(&hub);
            let other = other.clone();
            tokio::spawn(async move { hub.create(other, None).await })
        };
        store.entered.notified().await;

        let heads = tokio::time::timeout(std::time::Duration::from_secs(1), hub.heads(&default_id()))
            .await
            .expect("lookup finished while a create was pending")
            .unwrap();
        assert!(heads.is_empty());
        assert!(matches!(hub.get(&other).await, Err(HubError::NotFound(_))));

        store.release.notify_one();
        creating.await.unwrap().unwrap();
        assert_eq!(hub.store_ids().await, vec![default_id(), other.clone()]);
        assert!(matches!(
            hub.create(other, None).await,
            Err(HubError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_dump_to_writes_files() {
        let hub = hub().await;
        let dir = tempfile::tempdir().unwrap();
        let paths = hub.dump_to(dir.path()).await.unwrap();
        assert_eq!(paths, vec![dir.path().join("default.automerge")]);
        let bytes = std::fs::read(&paths[0]).unwrap();
        assert!(AutomergeReplica::load(&bytes).is_ok());
    }
}
