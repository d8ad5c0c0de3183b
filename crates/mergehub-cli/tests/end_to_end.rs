//! A real server on a loopback socket, driven over HTTP and WebSocket.

use std::sync::Arc;
use std::time::Duration;

use mergehub::core::{AutomergeReplica, Mutation, Replica, StoreId};
use mergehub::store::{MemoryStore, SnapshotStore};
use mergehub::sync::{ReplicaHandle, ResumablePeer, SessionEnd};
use mergehub::{BackupReport, Client, ClientConfig, HttpClient, Hub, HubConfig, SchedulerConfig, Shutdown};
use mergehub_cli::run_server;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct Running {
    base: String,
    hub: Arc<Hub<MemoryStore>>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<anyhow::Result<BackupReport>>,
}

async fn start(dump_dir: Option<std::path::PathBuf>) -> Running {
    let hub = Arc::new(
        Hub::open(Arc::new(MemoryStore::new()), HubConfig::default())
            .await
            .unwrap(),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let (stop, stopped) = oneshot::channel::<()>();
    let scheduler = SchedulerConfig {
        backup_interval: Duration::from_millis(50),
        dump_dir,
    };
    let task = tokio::spawn(run_server(listener, Arc::clone(&hub), scheduler, async move {
        let _ = stopped.await;
    }));
    Running {
        base,
        hub,
        stop,
        task,
    }
}

async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not reached");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resumable_client_converges_over_http() {
    let server = start(None).await;
    let store = StoreId::default_store();
    let http = HttpClient::new(&server.base).unwrap();

    let replica: AutomergeReplica = http.bootstrap(&store).await.unwrap();
    assert_eq!(replica.heads(), server.hub.heads(&store).await.unwrap());

    let handle = ReplicaHandle::new(replica);
    for _ in 0..3 {
        handle.apply(&Mutation::increment("counter", 1)).await.unwrap();
    }

    let mut peer = ResumablePeer::new(&*handle.lock().await);
    let (_, quiet) = peer.sync_until_quiet(&handle, &http, &store, 20).await.unwrap();
    assert!(quiet);

    assert_eq!(http.heads(&store).await.unwrap(), handle.heads().await);
    let values = server.hub.values(&store).await.unwrap();
    assert_eq!(values["counter"].as_i64(), Some(3));

    let _ = server.stop.send(());
    server.task.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bootstrap_creates_missing_store() {
    let server = start(None).await;
    let store = StoreId::new("fresh").unwrap();
    let http = HttpClient::new(&server.base).unwrap();

    assert_eq!(http.latest(&store).await.unwrap(), None);
    let replica: AutomergeReplica = http.bootstrap(&store).await.unwrap();
    assert_eq!(server.hub.heads(&store).await.unwrap(), replica.heads());
    assert!(!http.create(&store, replica.save()).await.unwrap());

    let _ = server.stop.send(());
    server.task.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn streaming_client_converges_over_websocket() {
    let dump = tempfile::tempdir().unwrap();
    let server = start(Some(dump.path().to_path_buf())).await;
    let store = StoreId::default_store();

    server
        .hub
        .with_exclusive(&store, |r| r.apply(&Mutation::increment("counter", 10)))
        .await
        .unwrap()
        .unwrap();

    let config = ClientConfig {
        server: server.base.clone(),
        ..ClientConfig::default()
    };
    let client: Arc<Client> = Arc::new(Client::connect(config).await.unwrap());
    client
        .handle()
        .apply(&Mutation::increment("counter", 5))
        .await
        .unwrap();

    let session_shutdown = Shutdown::new();
    let signal = session_shutdown.signal();
    let session_client = Arc::clone(&client);
    let session = tokio::spawn(async move { session_client.stream_once(&signal).await });

    let hub = Arc::clone(&server.hub);
    let handle = client.handle().clone();
    wait_until(|| {
        let (hub, handle, store) = (Arc::clone(&hub), handle.clone(), store.clone());
        async move { hub.heads(&store).await.unwrap() == handle.heads().await }
    })
    .await;
    assert_eq!(client.handle().counter("counter").await.unwrap(), Some(15));

    session_shutdown.trigger();
    let report = session.await.unwrap().unwrap();
    assert_eq!(report.end, SessionEnd::Cancelled);
    assert!(report.sent > 0 && report.received > 0);

    let _ = server.stop.send(());
    let backup = server.task.await.unwrap().unwrap();
    assert!(backup.failed.is_empty());
    assert!(dump.path().join("default.automerge").exists());

    let persisted = server.hub.store().current(&store).await.unwrap().unwrap();
    let replica = AutomergeReplica::load(&persisted.content).unwrap();
    assert_eq!(replica.counter("counter").unwrap(), Some(15));
}
