//! # mergehub-cli
//!
//! Wiring for the `mergehub` binary: the axum server in front of a
//! [`Hub`], the syncing client, and the dump inspector.
//!
//! The binary itself only parses arguments, installs logging and waits for
//! a termination signal. Everything here takes its stop condition as a
//! future so tests can drive it.

pub mod args;
pub mod inspect;
pub mod server;
pub mod socket;

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use mergehub::core::AutomergeReplica;
use mergehub::scheduler::{backup_loop, shutdown_server};
use mergehub::store::{SnapshotStore, SqliteStore};
use mergehub::{BackupReport, Client, ClientConfig, HttpClient, Hub, SchedulerConfig, Shutdown, TaskSet};
use tokio::net::TcpListener;

pub use server::{router, AppError, AppState};

/// Open the SQLite database at `path`, or an in-memory one for `:memory:`.
pub fn open_database(path: &Path) -> anyhow::Result<SqliteStore> {
    let store = if path == Path::new(":memory:") {
        SqliteStore::open_memory()
    } else {
        SqliteStore::open(path)
    };
    store.with_context(|| format!("opening database {}", path.display()))
}

/// Serve `hub` on `listener` until `stop` resolves, then flush.
pub async fn run_server<S, F>(
    listener: TcpListener,
    hub: Arc<Hub<S>>,
    scheduler: SchedulerConfig,
    stop: F,
) -> anyhow::Result<BackupReport>
where
    S: SnapshotStore + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let shutdown = Arc::new(Shutdown::new());
    let mut tasks = TaskSet::new();
    tasks.spawn(
        "backup",
        backup_loop(Arc::clone(&hub), scheduler.backup_interval, shutdown.signal()),
    );

    let app = router(AppState {
        hub: Arc::clone(&hub),
        shutdown: shutdown.signal(),
        sessions: tasks.sessions(),
    });

    let addr = listener.local_addr()?;
    let stores = hub.store_ids().await.len();
    tracing::info!(%addr, stores, "listening");

    let trigger = Arc::clone(&shutdown);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            stop.await;
            tracing::info!("shutdown signal received");
            trigger.trigger();
        })
        .await
        .context("server failed")?;

    let report = shutdown_server(&hub, &shutdown, tasks, scheduler.dump_dir.as_deref()).await;
    tracing::info!("server shut down");
    Ok(report)
}

/// Run a client until `stop` resolves. Returns the final counter value.
pub async fn run_client<F>(
    config: ClientConfig,
    actor: Option<Vec<u8>>,
    stop: F,
) -> anyhow::Result<Option<i64>>
where
    F: Future<Output = ()>,
{
    let http = HttpClient::new(&config.server)?;
    let mut replica: AutomergeReplica = http.bootstrap(&config.store).await?;
    if let Some(actor) = actor {
        replica.set_actor(&actor);
    }
    let name = replica.actor();
    tracing::info!(actor = %name, store = %config.store, mode = ?config.mode, "client started");

    let dump_dir = config.dump_dir.clone();
    let counter_key = config.counter_key.clone();
    let client = Arc::new(Client::with_replica(http, replica, config));

    let shutdown = Shutdown::new();
    let mut tasks = TaskSet::new();
    let (sync_client, sync_signal) = (Arc::clone(&client), shutdown.signal());
    tasks.spawn("sync", async move { sync_client.sync_loop(sync_signal).await });
    let (mutate_client, mutate_signal) = (Arc::clone(&client), shutdown.signal());
    tasks.spawn("mutate", async move { mutate_client.mutation_loop(mutate_signal).await });

    stop.await;
    shutdown.trigger();
    tasks.join_all().await;

    let value = client.handle().counter(&counter_key).await?;
    tracing::info!(actor = %name, key = %counter_key, value = ?value, "client stopped");

    if let Some(dir) = dump_dir {
        client.dump(&dir, &name).await?;
    }
    Ok(value)
}
