//! Full-duplex streaming sync over a frame transport.
//!
//! Two directions run concurrently against one replica:
//!
//! - **receive**: apply every binary frame as it arrives
//! - **send**: drain every generatable message, then drain again on a fixed
//!   interval or as soon as something was received
//!
//! The session ends when either direction ends or shutdown fires. The sender
//! is closed on every exit path. Nothing is persisted per message.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use mergehub_core::Replica;
use tokio::sync::{Mutex, Notify};
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::{Result, SyncError};
use crate::handle::ReplicaHandle;
use crate::shutdown::ShutdownSignal;
use crate::transport::{Frame, FrameReceiver, FrameSender};

/// Configuration for duplex sessions.
#[derive(Debug, Clone)]
pub struct DuplexConfig {
    /// Period of the send direction's re-drain.
    pub resend_interval: Duration,
}

impl Default for DuplexConfig {
    fn default() -> Self {
        Self {
            resend_interval: Duration::from_secs(1),
        }
    }
}

/// How a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The shutdown signal fired.
    Cancelled,
    /// The peer closed its stream.
    PeerClosed,
}

/// Result of a duplex session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplexReport {
    pub sent: u64,
    pub received: u64,
    /// Non-binary frames skipped.
    pub ignored: u64,
    pub end: SessionEnd,
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    received: AtomicU64,
    ignored: AtomicU64,
}

/// Run a duplex session until the peer closes, a direction fails, or
/// `shutdown` fires.
///
/// Lock order is sync state, then replica. Neither lock is held across a
/// transport call.
pub async fn run_duplex<R, S, V>(
    handle: &ReplicaHandle<R>,
    sender: &mut S,
    receiver: &mut V,
    config: &DuplexConfig,
    shutdown: &ShutdownSignal,
) -> Result<DuplexReport>
where
    R: Replica,
    S: FrameSender + ?Sized,
    V: FrameReceiver + ?Sized,
{
    let state = Mutex::new(handle.lock().await.new_sync_state());
    let wake = Notify::new();
    let counters = Counters::default();

    let outcome = tokio::select! {
        err = send_loop(handle, &state, sender, config.resend_interval, &wake, &counters) => Err(err),
        end = recv_loop(handle, &state, receiver, &wake, &counters) => end,
        _ = shutdown.cancelled() => Ok(SessionEnd::Cancelled),
    };

    if let Err(err) = sender.close().await {
        tracing::debug!(error = %err, "closing duplex sender failed");
    }

    let end = outcome?;
    let report = DuplexReport {
        sent: counters.sent.load(Ordering::Relaxed),
        received: counters.received.load(Ordering::Relaxed),
        ignored: counters.ignored.load(Ordering::Relaxed),
        end,
    };
    tracing::debug!(
        sent = report.sent,
        received = report.received,
        ignored = report.ignored,
        end = ?report.end,
        "duplex session ended"
    );
    Ok(report)
}

/// Runs until a send fails; returns that failure.
async fn send_loop<R, S>(
    handle: &ReplicaHandle<R>,
    state: &Mutex<R::SyncState>,
    sender: &mut S,
    period: Duration,
    wake: &Notify,
    counters: &Counters,
) -> SyncError
where
    R: Replica,
    S: FrameSender + ?Sized,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if let Err(err) = drain_to(handle, state, sender, counters).await {
            return err;
        }
        tokio::select! {
            _ = ticker.tick() => {}
            _ = wake.notified() => {}
        }
    }
}

async fn drain_to<R, S>(
    handle: &ReplicaHandle<R>,
    state: &Mutex<R::SyncState>,
    sender: &mut S,
    counters: &Counters,
) -> Result<()>
where
    R: Replica,
    S: FrameSender + ?Sized,
{
    loop {
        let message = {
            let mut state = state.lock().await;
            let replica = handle.lock().await;
            replica.generate_message(&mut state)
        };
        let Some(message) = message else {
            return Ok(());
        };
        sender.send(message).await?;
        counters.sent.fetch_add(1, Ordering::Relaxed);
    }
}

async fn recv_loop<R, V>(
    handle: &ReplicaHandle<R>,
    state: &Mutex<R::SyncState>,
    receiver: &mut V,
    wake: &Notify,
    counters: &Counters,
) -> Result<SessionEnd>
where
    R: Replica,
    V: FrameReceiver + ?Sized,
{
    loop {
        match receiver.recv().await? {
            None => return Ok(SessionEnd::PeerClosed),
            Some(Frame::Other) => {
                counters.ignored.fetch_add(1, Ordering::Relaxed);
            }
            Some(Frame::Binary(message)) => {
                {
                    let mut state = state.lock().await;
                    let mut replica = handle.lock().await;
                    replica.receive_message(&mut state, &message)?;
                }
                counters.received.fetch_add(1, Ordering::Relaxed);
                wake.notify_one();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::Shutdown;
    use crate::transport::memory::frame_pair;
    use mergehub_core::{AutomergeReplica, Mutation};

    fn fast() -> DuplexConfig {
        DuplexConfig {
            resend_interval: Duration::from_millis(20),
        }
    }

    async fn wait_for_heads(a: &ReplicaHandle<AutomergeReplica>, b: &ReplicaHandle<AutomergeReplica>) {
        for _ in 0..200 {
            if a.heads().await == b.heads().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("replicas did not converge");
    }

    #[tokio::test]
    async fn test_duplex_converges_and_cancels() {
        let server = ReplicaHandle::new(AutomergeReplica::empty());
        let client = ReplicaHandle::new(AutomergeReplica::empty());
        server.apply(&Mutation::put("side", "server")).await.unwrap();
        client.apply(&Mutation::increment("counter", 2)).await.unwrap();

        let ((mut s_tx, mut s_rx), (mut c_tx, mut c_rx)) = frame_pair();
        let shutdown = Shutdown::new();

        let server_task = {
            let server = server.clone();
            let signal = shutdown.signal();
            tokio::spawn(async move {
                run_duplex(&server, &mut s_tx, &mut s_rx, &fast(), &signal).await
            })
        };
        let client_task = {
            let client = client.clone();
            let signal = shutdown.signal();
            tokio::spawn(async move {
                run_duplex(&client, &mut c_tx, &mut c_rx, &fast(), &signal).await
            })
        };

        wait_for_heads(&server, &client).await;
        client.apply(&Mutation::increment("counter", 1)).await.unwrap();
        wait_for_heads(&server, &client).await;
        assert_eq!(server.counter("counter").await.unwrap(), Some(3));

        shutdown.trigger();
        let server_report = server_task.await.unwrap().unwrap();
        let client_report = client_task.await.unwrap().unwrap();
        assert!(server_report.received > 0);
        assert!(client_report.sent > 0);
    }

    #[tokio::test]
    async fn test_peer_close_ends_session_and_closes_sender() {
        let handle = ReplicaHandle::new(AutomergeReplica::empty());
        let ((mut tx, mut rx), (mut peer_tx, mut peer_rx)) = frame_pair();
        let shutdown = Shutdown::new();

        peer_tx.send_frame(Frame::Other).await.unwrap();
        peer_tx.close().await.unwrap();

        let report = run_duplex(&handle, &mut tx, &mut rx, &fast(), &shutdown.signal())
            .await
            .unwrap();
        assert_eq!(report.end, SessionEnd::PeerClosed);
        assert_eq!(report.ignored, 1);
        assert!(tx.is_closed());

        // Whatever was sent before closing, the stream then ends.
        while let Some(frame) = peer_rx.recv().await.unwrap() {
            assert!(matches!(frame, Frame::Binary(_)));
        }
    }

    #[tokio::test]
    async fn test_bad_frame_fails_session() {
        let handle = ReplicaHandle::new(AutomergeReplica::empty());
        let ((mut tx, mut rx), (mut peer_tx, _peer_rx)) = frame_pair();
        let shutdown = Shutdown::new();

        peer_tx.send(b"not a sync message".to_vec()).await.unwrap();

        let err = run_duplex(&handle, &mut tx, &mut rx, &fast(), &shutdown.signal())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidMessage(_)));
        assert!(tx.is_closed());
    }
}
