//! A single call on an open WebSocket connection.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

use ferry_protocol::{Chunk, Message, decode_chunk, encode_chunk};

use crate::{CLOSE_DRAIN_TIMEOUT, RpcError};

/// One inbound frame: a JSON envelope or a binary chunk.
#[derive(Debug)]
pub enum Frame {
    Message(Message),
    Chunk(Chunk),
}

/// Both ends of a call: the server side wraps a plain `TcpStream`, the
/// client side whatever `connect_async` produced.
pub struct Call<S = TcpStream> {
    ws: WebSocketStream<S>,
    peer: Option<SocketAddr>,
}

impl<S> Call<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(ws: WebSocketStream<S>, peer: Option<SocketAddr>) -> Self {
        Self { ws, peer }
    }

    /// Remote address, when known.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Sends a JSON envelope as a text frame.
    pub async fn send_msg(&mut self, msg: &Message) -> Result<(), RpcError> {
        let json = serde_json::to_string(msg)?;
        self.ws.send(WsMessage::Text(json.into())).await?;
        Ok(())
    }

    /// Sends a chunk as a binary frame.
    pub async fn send_chunk(&mut self, chunk: &Chunk) -> Result<(), RpcError> {
        let frame = encode_chunk(chunk)?;
        self.ws.send(WsMessage::Binary(frame.into())).await?;
        Ok(())
    }

    /// Waits for the next envelope or chunk.
    ///
    /// Returns `None` once the peer closed the connection. Control frames
    /// are skipped.
    pub async fn recv(&mut self) -> Result<Option<Frame>, RpcError> {
        loop {
            let msg = match self.ws.next().await {
                None => return Ok(None),
                Some(Ok(msg)) => msg,
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    return Ok(None);
                }
                Some(Err(e)) => return Err(e.into()),
            };

            match msg {
                WsMessage::Text(text) => {
                    let envelope: Message = serde_json::from_str(text.as_str())?;
                    return Ok(Some(Frame::Message(envelope)));
                }
                WsMessage::Binary(data) => {
                    return Ok(Some(Frame::Chunk(decode_chunk(&data)?)));
                }
                WsMessage::Close(_) => return Ok(None),
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
            }
        }
    }

    /// Starts the close handshake and discards anything the peer still
    /// sends until it closes too (bounded by [`CLOSE_DRAIN_TIMEOUT`]).
    pub async fn close(mut self) {
        if let Err(e) = self.ws.close(None).await {
            tracing::debug!(peer = ?self.peer, error = %e, "close frame not sent");
            return;
        }

        let drain = async {
            while let Some(Ok(_)) = self.ws.next().await {}
        };
        if tokio::time::timeout(CLOSE_DRAIN_TIMEOUT, drain).await.is_err() {
            tracing::debug!(peer = ?self.peer, "peer did not complete close handshake");
        }
    }
}
