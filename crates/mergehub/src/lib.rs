//! # mergehub
//!
//! A store-and-sync service for CRDT replicas.
//!
//! ## Overview
//!
//! A server holds one authoritative replica per named store and converges
//! it with any number of peers. Peers mutate locally and offline; a sync
//! session exchanges only what each side is missing, and merges commute, so
//! every replica that has seen the same changes ends up identical.
//!
//! - **Hub**: the server's store cache, one locked replica per store with
//!   durable snapshots behind it
//! - **Sessions**: resumable request/response rounds carried by a cookie, or
//!   long-lived duplex streams
//! - **Scheduler**: periodic backups and orderly shutdown
//! - **Client**: a peer that bootstraps from a server and syncs in the
//!   background
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mergehub::{Hub, HubConfig};
//! use mergehub::core::{Mutation, Replica, StoreId};
//! use mergehub::store::SqliteStore;
//!
//! async fn example() -> mergehub::Result<()> {
//!     let store = Arc::new(SqliteStore::open("mergehub.db")?);
//!     let hub: Hub<SqliteStore> = Hub::open(store, HubConfig::default()).await?;
//!
//!     let id = StoreId::default_store();
//!     hub.with_exclusive(&id, |replica| replica.apply(&Mutation::increment("counter", 1)))
//!         .await??;
//!
//!     let report = hub.backup_all().await;
//!     println!("wrote {} snapshots", report.written.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `mergehub::core` - Replica engine contract and identifiers
//! - `mergehub::store` - Snapshot persistence and SQLite
//! - `mergehub::sync` - Sync sessions

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod hub;
pub mod scheduler;

// Re-export component crates
pub use mergehub_core as core;
pub use mergehub_store as store;
pub use mergehub_sync as sync;

pub use client::{Client, HttpClient};
pub use config::{ClientConfig, HubConfig, SchedulerConfig, SyncMode};
pub use error::{ClientError, HubError, Result};
pub use hub::{BackupReport, Hub};
pub use scheduler::{
    backup_loop, shutdown_server, SessionGuard, SessionTracker, Shutdown, ShutdownSignal, TaskSet,
};

pub use mergehub_core::{AutomergeReplica, Mutation, Replica, StoreId};
