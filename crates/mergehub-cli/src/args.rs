//! Command line arguments.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use mergehub::core::StoreId;
use mergehub::sync::{limits, RoundConfig};
use mergehub::{ClientConfig, HubConfig, SchedulerConfig, SyncMode};

#[derive(Parser, Debug)]
#[command(name = "mergehub")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the store server
    Serve(ServeArgs),
    /// Run a syncing client that increments a counter
    Client(ClientArgs),
    /// Print heads and root values of a dumped replica
    Inspect {
        /// Path of a `.automerge` dump
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listen address
    #[arg(long, env = "MERGEHUB_ADDR", default_value = "127.0.0.1:8080")]
    pub addr: SocketAddr,

    /// SQLite database path, or `:memory:`
    #[arg(long, env = "MERGEHUB_DATABASE", default_value = "mergehub.db")]
    pub database: PathBuf,

    /// Stores to seed on startup
    #[arg(long = "store", env = "MERGEHUB_STORES", value_delimiter = ',', default_value = "default")]
    pub stores: Vec<String>,

    /// Period of the backup sweep
    #[arg(long, env = "MERGEHUB_BACKUP_INTERVAL_MS", default_value_t = 5000)]
    pub backup_interval_ms: u64,

    /// Messages per resumable round
    #[arg(long, default_value_t = limits::DEFAULT_MAX_ROUND_MESSAGES)]
    pub max_round_messages: usize,

    /// Dump every replica here on shutdown
    #[arg(long, env = "MERGEHUB_DUMP_DIR")]
    pub dump_dir: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Streaming,
    Resumable,
}

impl From<ModeArg> for SyncMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Streaming => SyncMode::Streaming,
            ModeArg::Resumable => SyncMode::Resumable,
        }
    }
}

#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Server base URL
    #[arg(long, env = "MERGEHUB_SERVER", default_value = "http://127.0.0.1:8080")]
    pub server: String,

    #[arg(long, env = "MERGEHUB_STORE", default_value = "default")]
    pub store: String,

    #[arg(long, value_enum, default_value_t = ModeArg::Streaming)]
    pub mode: ModeArg,

    #[arg(long, default_value_t = 1000)]
    pub sync_interval_ms: u64,

    #[arg(long, default_value_t = 1000)]
    pub mutate_min_ms: u64,

    #[arg(long, default_value_t = 5000)]
    pub mutate_max_ms: u64,

    /// Key the mutation loop increments
    #[arg(long, default_value = "counter")]
    pub counter_key: String,

    #[arg(long, default_value_t = limits::DEFAULT_MAX_ROUND_MESSAGES)]
    pub max_round_messages: usize,

    /// Actor id as hex; random if absent
    #[arg(long)]
    pub actor: Option<String>,

    /// Dump the replica here on shutdown
    #[arg(long, env = "MERGEHUB_DUMP_DIR")]
    pub dump_dir: Option<PathBuf>,
}

impl ServeArgs {
    pub fn hub_config(&self) -> anyhow::Result<HubConfig> {
        let seed_stores = self
            .stores
            .iter()
            .map(|s| StoreId::new(s.as_str()).with_context(|| format!("store id {s:?}")))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(HubConfig {
            seed_stores,
            round: RoundConfig {
                max_batch: self.max_round_messages,
            },
            ..HubConfig::default()
        })
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            backup_interval: Duration::from_millis(self.backup_interval_ms),
            dump_dir: self.dump_dir.clone(),
        }
    }
}

impl ClientArgs {
    pub fn client_config(&self) -> anyhow::Result<ClientConfig> {
        if self.mutate_max_ms < self.mutate_min_ms {
            anyhow::bail!("--mutate-max-ms must not be below --mutate-min-ms");
        }
        Ok(ClientConfig {
            server: self.server.clone(),
            store: StoreId::new(self.store.as_str())
                .with_context(|| format!("store id {:?}", self.store))?,
            mode: self.mode.into(),
            sync_interval: Duration::from_millis(self.sync_interval_ms),
            mutation_min: Duration::from_millis(self.mutate_min_ms),
            mutation_max: Duration::from_millis(self.mutate_max_ms),
            counter_key: self.counter_key.clone(),
            max_round_messages: self.max_round_messages,
            dump_dir: self.dump_dir.clone(),
            ..ClientConfig::default()
        })
    }

    pub fn actor_bytes(&self) -> anyhow::Result<Option<Vec<u8>>> {
        self.actor
            .as_deref()
            .map(|hex_id| hex::decode(hex_id).context("actor must be hex"))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["mergehub", "serve"]).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let config = args.hub_config().unwrap();
        assert_eq!(config.seed_stores, vec![StoreId::default_store()]);
        assert_eq!(config.round.max_batch, 100);
        assert_eq!(args.scheduler_config().backup_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_serve_rejects_bad_store() {
        let cli = Cli::try_parse_from(["mergehub", "serve", "--store", "ok,not ok"]).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert!(args.hub_config().is_err());
    }

    #[test]
    fn test_client_flags() {
        let cli = Cli::try_parse_from([
            "mergehub",
            "client",
            "--mode",
            "resumable",
            "--mutate-min-ms",
            "10",
            "--mutate-max-ms",
            "20",
            "--actor",
            "0a0b",
        ])
        .unwrap();
        let Command::Client(args) = cli.command else {
            panic!("expected client");
        };
        let config = args.client_config().unwrap();
        assert_eq!(config.mode, SyncMode::Resumable);
        assert_eq!(config.mutation_max, Duration::from_millis(20));
        assert_eq!(args.actor_bytes().unwrap(), Some(vec![0x0a, 0x0b]));
    }

    #[test]
    fn test_client_rejects_inverted_delay() {
        let cli = Cli::try_parse_from([
            "mergehub",
            "client",
            "--mutate-min-ms",
            "50",
            "--mutate-max-ms",
            "10",
        ])
        .unwrap();
        let Command::Client(args) = cli.command else {
            panic!("expected client");
        };
        assert!(args.client_config().is_err());
    }
}
