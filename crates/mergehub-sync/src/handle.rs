//! Shared, exclusively-locked access to one replica.

use std::sync::Arc;

use mergehub_core::{Mutation, Replica};
use tokio::sync::{Mutex, MutexGuard};

use crate::error::Result;

/// A cloneable handle to a replica behind an async mutex.
///
/// Every reader and writer of the replica goes through this lock, so no two
/// sessions ever observe or mutate the replica concurrently. The guard is
/// released on every exit path, including unwinding.
pub struct ReplicaHandle<R> {
    inner: Arc<Mutex<R>>,
}

impl<R> Clone for ReplicaHandle<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Replica> ReplicaHandle<R> {
    pub fn new(replica: R) -> Self {
        Self {
            inner: Arc::new(Mutex::new(replica)),
        }
    }

    /// Acquire the replica lock.
    pub async fn lock(&self) -> MutexGuard<'_, R> {
        self.inner.lock().await
    }

    /// Run `f` with exclusive access to the replica.
    pub async fn with_exclusive<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        let mut replica = self.inner.lock().await;
        f(&mut replica)
    }

    /// A consistent copy taken under the lock.
    pub async fn fork(&self) -> R {
        self.inner.lock().await.fork()
    }

    /// Serialize a consistent copy. Serialization runs outside the lock.
    pub async fn save(&self) -> Vec<u8> {
        self.fork().await.save()
    }

    pub async fn apply(&self, mutation: &Mutation) -> Result<()> {
        self.inner.lock().await.apply(mutation)?;
        Ok(())
    }

    pub async fn heads(&self) -> Vec<String> {
        self.inner.lock().await.heads()
    }

    pub async fn counter(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.inner.lock().await.counter(key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mergehub_core::AutomergeReplica;
    use std::time::Duration;

    #[tokio::test]
    async fn test_with_exclusive_serializes_access() {
        let handle = ReplicaHandle::new(AutomergeReplica::empty());

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..5 {
                    handle
                        .with_exclusive(|r| r.apply(&Mutation::increment("counter", 1)))
                        .await
                        .unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(handle.counter("counter").await.unwrap(), Some(40));
    }

    #[tokio::test]
    async fn test_lock_released_after_panic() {
        let handle = ReplicaHandle::new(AutomergeReplica::empty());

        let panicking = handle.clone();
        let result = tokio::spawn(async move {
            panicking
                .with_exclusive(|_| panic!("boom"))
                .await
        })
        .await;
        assert!(result.is_err());

        let acquired = tokio::time::timeout(Duration::from_secs(1), handle.lock()).await;
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn test_fork_does_not_alias() {
        let handle = ReplicaHandle::new(AutomergeReplica::empty());
        let mut copy = handle.fork().await;
        copy.apply(&Mutation::increment("counter", 1)).unwrap();
        assert_eq!(handle.counter("counter").await.unwrap(), None);
    }
}
