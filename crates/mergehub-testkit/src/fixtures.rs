//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use mergehub::{Hub, HubConfig};
use mergehub_core::{AutomergeReplica, Mutation, Replica, StoreId};
use mergehub_store::{MemoryStore, SnapshotStore};
use mergehub_sync::{ReplicaHandle, ResumablePeer};

/// A hub over an in-memory store, seeded with the default store.
pub struct HubFixture<S = MemoryStore> {
    pub hub: Arc<Hub<S>>,
    pub store: Arc<S>,
    pub store_id: StoreId,
}

impl HubFixture<MemoryStore> {
    pub async fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new())).await
    }
}

impl<S: SnapshotStore + 'static> HubFixture<S> {
    /// Open a hub over an existing store.
    pub async fn with_store(store: Arc<S>) -> Self {
        Self::with_config(store, HubConfig::default()).await
    }

    pub async fn with_config(store: Arc<S>, config: HubConfig) -> Self {
        let store_id = config
            .seed_stores
            .first()
            .cloned()
            .unwrap_or_else(StoreId::default_store);
        let hub = Hub::open(Arc::clone(&store), config)
            .await
            .expect("hub opens");
        Self {
            hub: Arc::new(hub),
            store,
            store_id,
        }
    }

    /// Create counters at zero on the hub so that peers forked afterwards
    /// all increment the same counter objects.
    pub async fn seed_counters(&self, keys: &[&str]) {
        self.hub
            .with_exclusive(&self.store_id, |r| {
                for key in keys {
                    r.apply(&Mutation::SetCounter {
                        key: (*key).to_string(),
                        value: 0,
                    })?;
                }
                Ok::<_, mergehub_core::ReplicaError>(())
            })
            .await
            .expect("store exists")
            .expect("counters apply");
    }

    /// A peer loaded from the hub's current replica, with actor `n`.
    pub async fn peer_from_hub(&self, n: u8) -> AutomergeReplica {
        let content = self.hub.fork(&self.store_id).await.expect("store exists");
        let mut replica = AutomergeReplica::load(&content).expect("fork loads");
        replica.set_actor(&actor(n));
        replica
    }

    /// Server-side counter value of the fixture store.
    pub async fn counter(&self, key: &str) -> Option<i64> {
        self.hub
            .with_exclusive(&self.store_id, |r| r.counter(key))
            .await
            .expect("store exists")
            .expect("counter readable")
    }

    /// Number of snapshots persisted for the fixture store.
    pub async fn history_len(&self) -> usize {
        self.store
            .history(&self.store_id)
            .await
            .expect("history readable")
            .len()
    }

    /// Sync a bare replica through the hub until a round is quiet.
    ///
    /// Returns the rounds it took. Panics if `max_rounds` is not enough.
    pub async fn converge(
        &self,
        replica: AutomergeReplica,
        peer: &mut ResumablePeer<AutomergeReplica>,
        max_rounds: usize,
    ) -> (AutomergeReplica, usize) {
        let handle = ReplicaHandle::new(replica);
        let (rounds, quiet) = peer
            .sync_until_quiet(&handle, self.hub.as_ref(), &self.store_id, max_rounds)
            .await
            .expect("rounds succeed");
        assert!(quiet, "not quiet after {max_rounds} rounds");
        let replica = handle.fork().await;
        (replica, rounds)
    }
}

/// A fixed 16-byte actor id for peer `n`.
pub fn actor(n: u8) -> Vec<u8> {
    vec![n; 16]
}

/// An empty replica with actor `n`.
pub fn peer(n: u8) -> AutomergeReplica {
    let mut replica = AutomergeReplica::empty();
    replica.set_actor(&actor(n));
    replica
}

/// `count` empty replicas with distinct actors, starting at 1.
pub fn peers(count: usize) -> Vec<AutomergeReplica> {
    (1..=count).map(|i| peer(i as u8)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixture_seeds_default_store() {
        let fixture = HubFixture::new().await;
        assert_eq!(fixture.store_id, StoreId::default_store());
        assert_eq!(fixture.history_len().await, 1);
        assert_eq!(fixture.counter("counter").await, None);

        fixture.seed_counters(&["counter", "hits"]).await;
        assert_eq!(fixture.counter("hits").await, Some(0));
    }

    #[tokio::test]
    async fn test_peer_from_hub_shares_heads() {
        let fixture = HubFixture::new().await;
        let peer = fixture.peer_from_hub(7).await;
        assert_eq!(peer.heads(), fixture.hub.heads(&fixture.store_id).await.unwrap());
        assert_eq!(peer.actor(), hex_of(&actor(7)));
    }

    #[test]
    fn test_peers_have_distinct_actors() {
        let mut ps = peers(3);
        for (i, p) in ps.iter_mut().enumerate() {
            p.apply(&Mutation::increment("counter", i as i64)).unwrap();
        }
        let actors: Vec<_> = ps.iter().map(|p| p.actor()).collect();
        assert_ne!(actors[0], actors[1]);
        assert_ne!(actors[1], actors[2]);
    }

    fn hex_of(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}
