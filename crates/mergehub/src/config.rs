//! Configuration for the hub, the scheduler and the client.

use std::path::PathBuf;
use std::time::Duration;

use mergehub_core::StoreId;
use mergehub_sync::{DuplexConfig, RoundConfig};

/// Configuration for the [`Hub`](crate::Hub).
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Stores created with an empty replica on open if absent.
    pub seed_stores: Vec<StoreId>,
    /// Resumable round limits.
    pub round: RoundConfig,
    /// Duplex session settings for streaming peers.
    pub duplex: DuplexConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            seed_stores: vec![StoreId::default_store()],
            round: RoundConfig::default(),
            duplex: DuplexConfig::default(),
        }
    }
}

/// Configuration for server background work.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Period of the backup sweep.
    pub backup_interval: Duration,
    /// Where to dump every replica on shutdown, if anywhere.
    pub dump_dir: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            backup_interval: Duration::from_secs(5),
            dump_dir: None,
        }
    }
}

/// Which session shape the client uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// WebSocket duplex sessions.
    Streaming,
    /// HTTP request/response rounds with a cookie.
    Resumable,
}

/// Configuration for a syncing client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL, e.g. `http://127.0.0.1:8080`.
    pub server: String,
    pub store: StoreId,
    pub mode: SyncMode,
    /// Pause between sync sessions or rounds.
    pub sync_interval: Duration,
    /// Bounds of the random delay between local increments.
    pub mutation_min: Duration,
    pub mutation_max: Duration,
    /// Key the mutation loop increments.
    pub counter_key: String,
    pub duplex: DuplexConfig,
    /// Messages per resumable batch.
    pub max_round_messages: usize,
    pub dump_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: "http://127.0.0.1:8080".to_string(),
            store: StoreId::default_store(),
            mode: SyncMode::Streaming,
            sync_interval: Duration::from_secs(1),
            mutation_min: Duration::from_secs(1),
            mutation_max: Duration::from_secs(5),
            counter_key: "counter".to_string(),
            duplex: DuplexConfig::default(),
            max_round_messages: mergehub_sync::limits::DEFAULT_MAX_ROUND_MESSAGES,
            dump_dir: None,
        }
    }
}
