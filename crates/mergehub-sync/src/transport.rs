//! Frame transport abstraction for duplex sessions.
//!
//! A duplex session needs an ordered, bidirectional stream of frames.
//! Implementations may use WebSockets, in-process channels, or anything else
//! that can carry binary payloads.

use async_trait::async_trait;

use crate::error::Result;

/// One inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A binary frame carrying one sync message.
    Binary(Vec<u8>),
    /// Any non-binary frame (text, ping, pong). Ignored by sessions.
    Other,
}

/// The sending half of a frame stream.
#[async_trait]
pub trait FrameSender: Send {
    /// Send one binary frame.
    async fn send(&mut self, payload: Vec<u8>) -> Result<()>;

    /// Close the stream. Must be safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}

/// The receiving half of a frame stream.
#[async_trait]
pub trait FrameReceiver: Send {
    /// The next frame, or `None` once the peer has closed the stream.
    async fn recv(&mut self) -> Result<Option<Frame>>;
}

/// In-process frame streams for testing.
///
/// Uses bounded channels to stand in for a socket.
pub mod memory {
    use super::*;
    use crate::error::SyncError;
    use tokio::sync::mpsc;

    const CHANNEL_CAPACITY: usize = 1000;

    /// Sending half of an in-memory frame stream.
    pub struct MemorySender {
        tx: Option<mpsc::Sender<Frame>>,
    }

    /// Receiving half of an in-memory frame stream.
    pub struct MemoryReceiver {
        rx: mpsc::Receiver<Frame>,
    }

    /// One side of a connected pair.
    pub type Endpoint = (MemorySender, MemoryReceiver);

    /// Two connected endpoints: what one sends, the other receives.
    pub fn frame_pair() -> (Endpoint, Endpoint) {
        let (a_tx, b_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (b_tx, a_rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            (MemorySender { tx: Some(a_tx) }, MemoryReceiver { rx: a_rx }),
            (MemorySender { tx: Some(b_tx) }, MemoryReceiver { rx: b_rx }),
        )
    }

    impl MemorySender {
        /// Send an arbitrary frame, including non-binary ones.
        pub async fn send_frame(&mut self, frame: Frame) -> Result<()> {
            let tx = self
                .tx
                .as_ref()
                .ok_or_else(|| SyncError::Transport("sender closed".into()))?;
            tx.send(frame)
                .await
                .map_err(|_| SyncError::Transport("peer disconnected".into()))
        }

        pub fn is_closed(&self) -> bool {
            self.tx.is_none()
        }
    }

    #[async_trait]
    impl FrameSender for MemorySender {
        async fn send(&mut self, payload: Vec<u8>) -> Result<()> {
            self.send_frame(Frame::Binary(payload)).await
        }

        async fn close(&mut self) -> Result<()> {
            self.tx = None;
            Ok(())
        }
    }

    #[async_trait]
    impl FrameReceiver for MemoryReceiver {
        async fn recv(&mut self) -> Result<Option<Frame>> {
            Ok(self.rx.recv().await)
        }
    }
}
