//! The syncing peer: bootstrap from a server, mutate locally, sync in the
//! background.
//!
//! A [`Client`] owns one replica behind a [`ReplicaHandle`]. Two loops share
//! it: [`Client::sync_loop`] runs a streaming session or a resumable round
//! every `sync_interval`, and [`Client::mutation_loop`] increments the
//! counter at random intervals. Both stop when the shutdown signal fires.

mod http;
pub mod ws;

use std::path::{Path, PathBuf};
use std::time::Duration;

use mergehub_core::{AutomergeReplica, Mutation, Replica};
use mergehub_sync::{
    run_duplex, DuplexReport, ReplicaHandle, ResumablePeer, RoundSummary, ShutdownSignal,
};
use rand::Rng;

pub use http::HttpClient;

use crate::config::{ClientConfig, SyncMode};
use crate::error::ClientError;

/// A peer syncing one store with one server.
pub struct Client<R: Replica = AutomergeReplica> {
    http: HttpClient,
    handle: ReplicaHandle<R>,
    config: ClientConfig,
}

impl<R: Replica> Client<R> {
    /// Bootstrap the replica from the server, creating the store if needed.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let http = HttpClient::new(&config.server)?;
        let replica = http.bootstrap::<R>(&config.store).await?;
        Ok(Self::with_replica(http, replica, config))
    }

    /// Wrap an already loaded replica.
    pub fn with_replica(http: HttpClient, replica: R, config: ClientConfig) -> Self {
        Self {
            http,
            handle: ReplicaHandle::new(replica),
            config,
        }
    }

    pub fn handle(&self) -> &ReplicaHandle<R> {
        &self.handle
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect over WebSocket and run one duplex session until it ends.
    pub async fn stream_once(&self, shutdown: &ShutdownSignal) -> Result<DuplexReport, ClientError> {
        let url = self.http.ws_url(&self.config.store);
        let (mut sender, mut receiver) = ws::connect(&url).await?;
        let report = run_duplex(
            &self.handle,
            &mut sender,
            &mut receiver,
            &self.config.duplex,
            shutdown,
        )
        .await?;
        Ok(report)
    }

    /// Run one resumable round over HTTP.
    pub async fn round_once(&self, peer: &mut ResumablePeer<R>) -> Result<RoundSummary, ClientError> {
        Ok(peer
            .exchange(&self.handle, &self.http, &self.config.store)
            .await?)
    }

    /// A fresh resumable peer sized by this client's config.
    pub async fn new_peer(&self) -> ResumablePeer<R> {
        let replica = self.handle.lock().await;
        ResumablePeer::new(&*replica).with_max_batch(self.config.max_round_messages)
    }

    /// Sync every `sync_interval` until shutdown. Failures are logged and
    /// retried on the next tick.
    pub async fn sync_loop(&self, shutdown: ShutdownSignal) {
        let mut peer = self.new_peer().await;
        let store = &self.config.store;

        while !shutdown.is_cancelled() {
            match self.config.mode {
                SyncMode::Streaming => match self.stream_once(&shutdown).await {
                    Ok(report) => tracing::info!(
                        store = %store,
                        sent = report.sent,
                        received = report.received,
                        end = ?report.end,
                        "streaming session ended"
                    ),
                    Err(err) => tracing::warn!(store = %store, error = %err, "streaming session failed"),
                },
                SyncMode::Resumable => {
                    let result = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        result = self.round_once(&mut peer) => result,
                    };
                    match result {
                        Ok(summary) if !summary.is_quiet() => tracing::debug!(
                            store = %store,
                            sent = summary.sent,
                            received = summary.received,
                            "resumable round"
                        ),
                        Ok(_) => {}
                        Err(err) => tracing::warn!(store = %store, error = %err, "resumable round failed"),
                    }
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.sync_interval) => {}
            }
        }
        tracing::info!(store = %store, "sync loop stopped");
    }

    /// Increment the counter after a random delay, until shutdown.
    pub async fn mutation_loop(&self, shutdown: ShutdownSignal) {
        let key = self.config.counter_key.as_str();
        let mutation = Mutation::increment(key, 1);

        loop {
            let delay = random_delay(self.config.mutation_min, self.config.mutation_max);
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            let result = self
                .handle
                .with_exclusive(|replica| {
                    replica.apply(&mutation)?;
                    replica.counter(key)
                })
                .await;
            match result {
                Ok(value) => tracing::info!(key, value = ?value, "incremented"),
                Err(err) => tracing::warn!(key, error = %err, "local mutation failed"),
            }
        }
        tracing::info!("mutation loop stopped");
    }

    /// Write the replica to `<dir>/<name>.automerge`.
    pub async fn dump(&self, dir: &Path, name: &str) -> Result<PathBuf, ClientError> {
        let content = self.handle.save().await;
        let path = dir.join(format!("{name}.automerge"));
        let target = path.clone();
        tokio::task::spawn_blocking(move || std::fs::write(&target, content))
            .await
            .map_err(|e| ClientError::Io(std::io::Error::other(e)))??;
        tracing::info!(path = %path.display(), "dumped replica");
        Ok(path)
    }
}

/// A uniformly random delay in `[min, max]`.
pub fn random_delay(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    rand::thread_rng().gen_range(min..=max)
}
