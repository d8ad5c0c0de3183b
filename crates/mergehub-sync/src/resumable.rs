//! Cookie-based resumable request/response sync.
//!
//! The server side is a pure function of (replica, cookie, inbound messages):
//! [`run_round`] mutates the replica it is given and returns the new cookie,
//! the outbound batch, and whether the replica changed. Persisting the result
//! and swapping it in is the caller's business.
//!
//! The caller side is [`ResumablePeer`], which keeps its own engine sync state
//! across rounds and hands the server's cookie back verbatim.
//!
//! ```text
//! Peer                                   Server
//!   |--- {cookie: null, messages: []} ---->|  fresh state, no generation
//!   |<-- {cookie: C1,   messages: []} -----|
//!   |--- {cookie: C1,   messages: [..]} -->|  generate, apply, generate
//!   |<-- {cookie: C2,   messages: [..]} ---|  commit if heads moved
//!   |            ...                       |
//!   |--- {cookie: Cn,   messages: []} ---->|  nothing new: same cookie back
//!   |<-- {cookie: Cn,   messages: []} -----|
//! ```

use async_trait::async_trait;
use mergehub_core::{Cookie, Replica, StoreId};

use crate::cookie::SessionCookie;
use crate::error::{Result, SyncError};
use crate::handle::ReplicaHandle;
use crate::messages::{limits, SyncRequest, SyncResponse};

/// Configuration for resumable rounds.
#[derive(Debug, Clone)]
pub struct RoundConfig {
    /// Maximum messages generated per batch. A round has two batches.
    pub max_batch: usize,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            max_batch: limits::DEFAULT_MAX_ROUND_MESSAGES,
        }
    }
}

/// Result of one server-side round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    pub cookie: Cookie,
    pub messages: Vec<Vec<u8>>,
    /// Whether the replica heads moved during the round.
    pub mutated: bool,
    /// Inbound messages applied.
    pub received: usize,
}

impl RoundOutcome {
    pub fn into_response(self) -> SyncResponse {
        SyncResponse {
            cookie: self.cookie,
            messages: self.messages,
        }
    }
}

/// Run one resumable round against `replica`.
///
/// On error the replica may hold some of the inbound changes; callers run
/// rounds on a fork and discard it on failure.
pub fn run_round<R: Replica>(
    replica: &mut R,
    request: SyncRequest,
    config: &RoundConfig,
) -> Result<RoundOutcome> {
    let SyncRequest {
        cookie,
        messages: inbound,
    } = request;

    let Some(cookie) = cookie else {
        if !inbound.is_empty() {
            return Err(SyncError::ProtocolViolation(format!(
                "{} messages sent without a cookie",
                inbound.len()
            )));
        }
        let state = replica.new_sync_state();
        let cookie =
            SessionCookie::new(replica.save_sync_state(&state), replica.heads(), false).encode()?;
        return Ok(RoundOutcome {
            cookie,
            messages: Vec::new(),
            mutated: false,
            received: 0,
        });
    };

    let envelope = SessionCookie::decode(&cookie)?;
    let heads_before = replica.heads();

    // A decoded engine state always believes it owes the peer a message, so a
    // round that provably has nothing to do must not consult the engine.
    if envelope.drained && inbound.is_empty() && envelope.heads == heads_before {
        return Ok(RoundOutcome {
            cookie,
            messages: Vec::new(),
            mutated: false,
            received: 0,
        });
    }

    let mut state = replica.load_sync_state(&envelope.engine)?;
    let mut outbound = Vec::new();

    // 1. Catch the peer up on what it is missing
    drain(replica, &mut state, config.max_batch, &mut outbound);

    // 2. Apply everything the peer sent; any failure aborts the round
    for message in &inbound {
        replica.receive_message(&mut state, message)?;
    }

    // 3. Respond to what we just learned
    let drained = drain(replica, &mut state, config.max_batch, &mut outbound);

    let heads_after = replica.heads();
    let mutated = heads_after != heads_before;
    let cookie =
        SessionCookie::new(replica.save_sync_state(&state), heads_after, drained).encode()?;

    Ok(RoundOutcome {
        cookie,
        messages: outbound,
        mutated,
        received: inbound.len(),
    })
}

/// Generate up to `max` messages. Returns true if generation ran dry.
fn drain<R: Replica>(
    replica: &R,
    state: &mut R::SyncState,
    max: usize,
    out: &mut Vec<Vec<u8>>,
) -> bool {
    for _ in 0..max.max(1) {
        match replica.generate_message(state) {
            Some(message) => out.push(message),
            None => return true,
        }
    }
    false
}

/// One round trip to a resumable sync server.
#[async_trait]
pub trait RoundTransport: Send + Sync {
    async fn round(&self, store_id: &StoreId, request: SyncRequest) -> Result<SyncResponse>;
}

/// Traffic of one peer-side round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundSummary {
    /// Whether this round opened the session.
    pub bootstrap: bool,
    pub sent: usize,
    pub received: usize,
}

impl RoundSummary {
    /// Neither side had anything to say.
    pub fn is_quiet(&self) -> bool {
        !self.bootstrap && self.sent == 0 && self.received == 0
    }
}

/// The caller side of a resumable session.
pub struct ResumablePeer<R: Replica> {
    state: R::SyncState,
    cookie: Option<Cookie>,
    /// Sync state saved before the last `prepare`, restored if the round fails.
    pending: Option<Vec<u8>>,
    max_batch: usize,
    /// Heads and batch size at the last `prepare`.
    prepared_heads: Vec<String>,
    prepared_sent: usize,
    /// Rounds in a row that carried traffic but left the local heads alone.
    stalled: usize,
}

impl<R: Replica> ResumablePeer<R> {
    pub fn new(replica: &R) -> Self {
        Self {
            state: replica.new_sync_state(),
            cookie: None,
            pending: None,
            max_batch: limits::DEFAULT_MAX_ROUND_MESSAGES,
            prepared_heads: Vec::new(),
            prepared_sent: 0,
            stalled: 0,
        }
    }

    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }

    pub fn cookie(&self) -> Option<&Cookie> {
        self.cookie.as_ref()
    }

    /// Build the next request. No messages are sent before the first cookie.
    ///
    /// After [`limits::MAX_STALLED_ROUNDS`] rounds without progress the
    /// session starts over. The engine state remembers every change it sent,
    /// so changes the server dropped (a restart, a discarded round) are
    /// otherwise never offered again.
    pub fn prepare(&mut self, replica: &R) -> SyncRequest {
        if self.stalled >= limits::MAX_STALLED_ROUNDS {
            tracing::debug!(rounds = self.stalled, "resumable session stalled, restarting");
            self.reset(replica);
        }
        self.prepared_heads = replica.heads();
        self.prepared_sent = 0;

        let Some(cookie) = self.cookie.clone() else {
            return SyncRequest::bootstrap();
        };
        self.pending = Some(replica.save_sync_state(&self.state));
        let mut messages = Vec::new();
        drain(replica, &mut self.state, self.max_batch, &mut messages);
        self.prepared_sent = messages.len();
        SyncRequest::resume(cookie, messages)
    }

    /// Store the returned cookie and apply the returned messages.
    pub fn absorb(&mut self, replica: &mut R, response: SyncResponse) -> Result<usize> {
        self.pending = None;
        self.cookie = Some(response.cookie);
        for message in &response.messages {
            replica.receive_message(&mut self.state, message)?;
        }

        let received = response.messages.len();
        if (self.prepared_sent == 0 && received == 0) || replica.heads() != self.prepared_heads {
            self.stalled = 0;
        } else {
            self.stalled += 1;
        }
        Ok(received)
    }

    /// Forget that the last prepared messages were sent.
    pub fn abandon(&mut self, replica: &R) {
        if let Some(saved) = self.pending.take() {
            self.state = replica
                .load_sync_state(&saved)
                .unwrap_or_else(|_| replica.new_sync_state());
        }
    }

    /// Drop the session entirely; the next round bootstraps.
    pub fn reset(&mut self, replica: &R) {
        self.state = replica.new_sync_state();
        self.cookie = None;
        self.pending = None;
        self.stalled = 0;
    }

    /// Run one round. The replica lock is held while preparing and while
    /// absorbing, never across the transport call.
    pub async fn exchange<T>(
        &mut self,
        handle: &ReplicaHandle<R>,
        transport: &T,
        store_id: &StoreId,
    ) -> Result<RoundSummary>
    where
        T: RoundTransport + ?Sized,
    {
        let request = {
            let replica = handle.lock().await;
            self.prepare(&replica)
        };
        let bootstrap = request.cookie.is_none();
        let sent = request.messages.len();

        let response = match transport.round(store_id, request).await {
            Ok(response) => response,
            Err(err) => {
                let replica = handle.lock().await;
                if err.is_caller_error() {
                    self.reset(&replica);
                } else {
                    self.abandon(&replica);
                }
                return Err(err);
            }
        };

        let received = {
            let mut replica = handle.lock().await;
            self.absorb(&mut replica, response)?
        };

        tracing::trace!(store = %store_id, sent, received, "resumable round");
        Ok(RoundSummary {
            bootstrap,
            sent,
            received,
        })
    }

    /// Run rounds until one is quiet or `max_rounds` have run.
    ///
    /// Returns the number of rounds run and whether the last was quiet.
    pub async fn sync_until_quiet<T>(
        &mut self,
        handle: &ReplicaHandle<R>,
        transport: &T,
        store_id: &StoreId,
        max_rounds: usize,
    ) -> Result<(usize, bool)>
    where
        T: RoundTransport + ?Sized,
    {
        for round in 1..=max_rounds {
            if self.exchange(handle, transport, store_id).await?.is_quiet() {
                return Ok((round, true));
            }
        }
        Ok((max_rounds, false))
    }
}
