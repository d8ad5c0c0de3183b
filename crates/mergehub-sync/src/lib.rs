//! # mergehub sync
//!
//! Sync sessions for converging replicas through a central store service.
//!
//! ## Overview
//!
//! Two session shapes carry the same opaque engine messages:
//!
//! - **Resumable** ([`run_round`], [`ResumablePeer`]): stateless
//!   request/response rounds. The server keeps no per-peer state; the caller
//!   carries a [`Cookie`](mergehub_core::Cookie) from round to round.
//! - **Duplex** ([`run_duplex`]): a long-lived bidirectional frame stream
//!   with sync state held in memory for the life of the connection.
//!
//! ## Key Properties
//!
//! - **Idempotent**: replaying a message is harmless
//! - **Commutative**: message order doesn't affect the final state
//! - **Resumable**: a lost round stalls, it never corrupts
//! - **Stable**: a round with nothing to do returns nothing and the same cookie
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mergehub_core::{AutomergeReplica, Replica, StoreId};
//! use mergehub_sync::{ReplicaHandle, ResumablePeer, RoundTransport};
//!
//! async fn example(transport: &dyn RoundTransport) -> mergehub_sync::Result<()> {
//!     let handle = ReplicaHandle::new(AutomergeReplica::empty());
//!     let mut peer = ResumablePeer::new(&*handle.lock().await);
//!     let store = StoreId::default_store();
//!
//!     let (rounds, quiet) = peer.sync_until_quiet(&handle, transport, &store, 10).await?;
//!     println!("{rounds} rounds, quiet: {quiet}");
//!     Ok(())
//! }
//! ```

pub mod cookie;
pub mod duplex;
pub mod error;
pub mod handle;
pub mod local;
pub mod messages;
pub mod resumable;
pub mod shutdown;
pub mod transport;

pub use cookie::{SessionCookie, COOKIE_VERSION};
pub use duplex::{run_duplex, DuplexConfig, DuplexReport, SessionEnd};
pub use error::{Result, SyncError};
pub use handle::ReplicaHandle;
pub use local::{sync_pair, PairReport};
pub use messages::{limits, SyncRequest, SyncResponse};
pub use resumable::{
    run_round, ResumablePeer, RoundConfig, RoundOutcome, RoundSummary, RoundTransport,
};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use transport::{memory::frame_pair, Frame, FrameReceiver, FrameSender};
