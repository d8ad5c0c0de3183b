//! tokio-tungstenite adapters for duplex sessions.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{Sink, SinkExt, Stream, StreamExt};
use mergehub_sync::{Frame, FrameReceiver, FrameSender, SyncError};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::ClientError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Sending half of a client WebSocket.
pub struct WsSender<S> {
    sink: S,
    closed: bool,
}

/// Receiving half of a client WebSocket.
pub struct WsReceiver<S> {
    stream: S,
}

/// Open a WebSocket and split it into frame halves.
pub async fn connect(
    url: &str,
) -> Result<(WsSender<SplitSink<Socket, Message>>, WsReceiver<SplitStream<Socket>>), ClientError> {
    let (socket, _) = tokio_tungstenite::connect_async(url).await?;
    tracing::debug!(url, "websocket connected");
    let (sink, stream) = socket.split();
    Ok((WsSender::new(sink), WsReceiver::new(stream)))
}

impl<S> WsSender<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            closed: false,
        }
    }
}

impl<S> WsReceiver<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

fn transport(err: WsError) -> SyncError {
    SyncError::Transport(err.to_string())
}

#[async_trait]
impl<S> FrameSender for WsSender<S>
where
    S: Sink<Message, Error = WsError> + Unpin + Send,
{
    async fn send(&mut self, payload: Vec<u8>) -> mergehub_sync::Result<()> {
        self.sink
            .send(Message::Binary(payload.into()))
            .await
            .map_err(transport)
    }

    async fn close(&mut self) -> mergehub_sync::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(err) => Err(transport(err)),
        }
    }
}

#[async_trait]
impl<S> FrameReceiver for WsReceiver<S>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin + Send,
{
    async fn recv(&mut self) -> mergehub_sync::Result<Option<Frame>> {
        match self.stream.next().await {
            None | Some(Ok(Message::Close(_))) => Ok(None),
            Some(Err(WsError::ConnectionClosed)) | Some(Err(WsError::AlreadyClosed)) => Ok(None),
            Some(Err(err)) => Err(transport(err)),
            Some(Ok(Message::Binary(data))) => Ok(Some(Frame::Binary(data.to_vec()))),
            Some(Ok(_)) => Ok(Some(Frame::Other)),
        }
    }
}
