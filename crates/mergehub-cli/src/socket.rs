//! Frame adapters over an axum WebSocket.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use mergehub::sync::{Frame, FrameReceiver, FrameSender, Result, SyncError};

pub struct SocketSender {
    sink: SplitSink<WebSocket, Message>,
    closed: bool,
}

pub struct SocketReceiver {
    stream: SplitStream<WebSocket>,
}

/// Split an upgraded socket into frame halves.
pub fn split(socket: WebSocket) -> (SocketSender, SocketReceiver) {
    let (sink, stream) = socket.split();
    (
        SocketSender {
            sink,
            closed: false,
        },
        SocketReceiver { stream },
    )
}

#[async_trait]
impl FrameSender for SocketSender {
    async fn send(&mut self, payload: Vec<u8>) -> Result<()> {
        self.sink
            .send(Message::Binary(payload.into()))
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // The peer may already be gone.
        if let Err(err) = self.sink.close().await {
            tracing::trace!(error = %err, "socket close");
        }
        Ok(())
    }
}

#[async_trait]
impl FrameReceiver for SocketReceiver {
    async fn recv(&mut self) -> Result<Option<Frame>> {
        match self.stream.next().await {
            None | Some(Ok(Message::Close(_))) => Ok(None),
            Some(Ok(Message::Binary(data))) => Ok(Some(Frame::Binary(data.to_vec()))),
            Some(Ok(_)) => Ok(Some(Frame::Other)),
            Some(Err(err)) => Err(SyncError::Transport(err.to_string())),
        }
    }
}
