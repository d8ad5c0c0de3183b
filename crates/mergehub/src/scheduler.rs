//! Background work for the server: the backup loop, session tracking and
//! orderly shutdown.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mergehub_core::Replica;
use mergehub_store::SnapshotStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub use mergehub_sync::{Shutdown, ShutdownSignal};

use crate::hub::{BackupReport, Hub};

/// Counts work spawned by someone else, such as upgraded connections.
///
/// Each session holds a [`SessionGuard`] for as long as it runs.
#[derive(Clone)]
pub struct SessionTracker {
    active: Arc<watch::Sender<usize>>,
}

impl Default for SessionTracker {
    fn default() -> Self {
        let (active, _) = watch::channel(0);
        Self {
            active: Arc::new(active),
        }
    }
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. It counts until the guard is dropped.
    pub fn enter(&self) -> SessionGuard {
        self.active.send_modify(|n| *n += 1);
        SessionGuard {
            active: Arc::clone(&self.active),
        }
    }

    pub fn active(&self) -> usize {
        *self.active.borrow()
    }

    /// Wait until no session is running.
    pub async fn wait_idle(&self) {
        let mut active = self.active.subscribe();
        // The sender lives in `self`, so this cannot fail.
        let _ = active.wait_for(|n| *n == 0).await;
    }
}

/// Marks one running session of a [`SessionTracker`].
pub struct SessionGuard {
    active: Arc<watch::Sender<usize>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Spawned tasks that are joined, not aborted, at shutdown, plus the
/// sessions registered with [`TaskSet::sessions`].
#[derive(Default)]
pub struct TaskSet {
    handles: Vec<(&'static str, JoinHandle<()>)>,
    sessions: SessionTracker,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&mut self, name: &'static str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handles.push((name, tokio::spawn(fut)));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Tracker for sessions that [`TaskSet::join_all`] also waits for.
    pub fn sessions(&self) -> SessionTracker {
        self.sessions.clone()
    }

    /// Wait for every task and every tracked session to finish.
    pub async fn join_all(self) {
        for (name, handle) in self.handles {
            match handle.await {
                Ok(()) => tracing::debug!(task = name, "task finished"),
                Err(err) => tracing::warn!(task = name, error = %err, "task failed"),
            }
        }

        let active = self.sessions.active();
        if active > 0 {
            tracing::debug!(sessions = active, "waiting for sessions");
        }
        self.sessions.wait_idle().await;
    }
}

/// Call [`Hub::backup_all`] every `period` until shutdown.
pub async fn backup_loop<S, R>(hub: Arc<Hub<S, R>>, period: Duration, shutdown: ShutdownSignal)
where
    S: SnapshotStore + 'static,
    R: Replica,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let report = hub.backup_all().await;
                if !report.written.is_empty() || !report.failed.is_empty() {
                    tracing::debug!(
                        written = report.written.len(),
                        unchanged = report.unchanged,
                        failed = report.failed.len(),
                        "backup sweep"
                    );
                }
            }
        }
    }
    tracing::info!("backup loop stopped");
}

/// Stop background work and flush.
///
/// Fires the signal, waits for every task and session to finish its current
/// iteration, then runs a final backup and, if configured, a dump.
pub async fn shutdown_server<S, R>(
    hub: &Hub<S, R>,
    shutdown: &Shutdown,
    tasks: TaskSet,
    dump_dir: Option<&Path>,
) -> BackupReport
where
    S: SnapshotStore + 'static,
    R: Replica,
{
    shutdown.trigger();
    tasks.join_all().await;

    let report = hub.backup_all().await;
    tracing::info!(
        written = report.written.len(),
        failed = report.failed.len(),
        "final backup"
    );

    if let Some(dir) = dump_dir {
        if let Err(err) = hub.dump_to(dir).await {
            tracing::error!(error = %err, dir = %dir.display(), "dump failed");
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use mergehub_core::{Mutation, StoreId};
    use mergehub_store::MemoryStore;

    #[tokio::test]
    async fn test_backup_loop_persists_and_stops() {
        let hub: Arc<Hub<MemoryStore>> = Arc::new(
            Hub::open(Arc::new(MemoryStore::new()), HubConfig::default())
                .await
                .unwrap(),
        );
        let id = StoreId::default_store();
        let shutdown = Shutdown::new();
        let mut tasks = TaskSet::new();
        tasks.spawn(
            "backup",
            backup_loop(Arc::clone(&hub), Duration::from_millis(10), shutdown.signal()),
        );

        hub.with_exclusive(&id, |r| r.apply(&Mutation::increment("counter", 1)))
            .await
            .unwrap()
            .unwrap();

        let mut persisted = false;
        for _ in 0..100 {
            if hub.store().history(&id).await.unwrap().len() == 2 {
                persisted = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(persisted);

        let report = shutdown_server(&hub, &shutdown, tasks, None).await;
        assert!(report.written.is_empty());
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_sessions_before_final_backup() {
        let hub: Arc<Hub<MemoryStore>> = Arc::new(
            Hub::open(Arc::new(MemoryStore::new()), HubConfig::default())
                .await
                .unwrap(),
        );
        let id = StoreId::default_store();
        let shutdown = Shutdown::new();
        let tasks = TaskSet::new();

        // A session that keeps writing for a while after the signal.
        let guard = tasks.sessions().enter();
        let session = {
            let hub = Arc::clone(&hub);
            let signal = shutdown.signal();
            let id = id.clone();
            tokio::spawn(async move {
                let _guard = guard;
                signal.cancelled().await;
                tokio::time::sleep(Duration::from_millis(50)).await;
                hub.with_exclusive(&id, |r| r.apply(&Mutation::increment("counter", 1)))
                    .await
                    .unwrap()
                    .unwrap();
            })
        };
        assert_eq!(tasks.sessions().active(), 1);

        let report = shutdown_server(&hub, &shutdown, tasks, None).await;
        assert_eq!(report.written, vec![id.clone()]);
        session.await.unwrap();

        let current = hub.store().current(&id).await.unwrap().unwrap();
        let persisted = mergehub_core::AutomergeReplica::load(&current.content).unwrap();
        assert_eq!(persisted.counter("counter").unwrap(), Some(1));
    }

    #[test]
    fn test_session_guard_counts() {
        let tracker = SessionTracker::new();
        let a = tracker.enter();
        let b = tracker.enter();
        assert_eq!(tracker.active(), 2);
        drop(a);
        drop(b);
        assert_eq!(tracker.active(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_unsaved_changes() {
        let hub: Hub<MemoryStore> = Hub::open(Arc::new(MemoryStore::new()), HubConfig::default())
            .await
            .unwrap();
        let id = StoreId::default_store();
        hub.with_exclusive(&id, |r| r.apply(&Mutation::increment("counter", 5)))
            .await
            .unwrap()
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let report = shutdown_server(&hub, &Shutdown::new(), TaskSet::new(), Some(dir.path())).await;
        assert_eq!(report.written, vec![id]);
        assert!(dir.path().join("default.automerge").exists());
    }
}
