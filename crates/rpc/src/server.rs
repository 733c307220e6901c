//! Call server.
//!
//! Upgrades each accepted TCP connection to WebSocket, reads the opening
//! envelope and routes the call to the [`Handler`].

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async_with_config;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;

use ferry_protocol::constants::WS_MAX_MESSAGE_SIZE;
use ferry_protocol::{ErrorKind, Message, MessageType};
use ferry_transfer::DispatchMode;

use crate::call::{Call, Frame};
use crate::handler::Handler;
use crate::{DEFAULT_RPC_PORT, RpcError};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    pub mode: DispatchMode,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_RPC_PORT,
            mode: DispatchMode::pooled(),
        }
    }
}

/// The call server.
pub struct RpcServer<H: Handler> {
    config: RpcServerConfig,
    handler: Arc<H>,
    cancel: CancellationToken,
}

impl<H: Handler> RpcServer<H> {
    pub fn new(config: RpcServerConfig, handler: H, cancel: CancellationToken) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
            cancel,
        }
    }

    /// Binds the configured port on all interfaces.
    pub async fn bind(&self) -> Result<TcpListener, RpcError> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.config.port).into();
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(
            addr = %listener.local_addr()?,
            mode = %self.config.mode,
            "call server listening"
        );
        Ok(listener)
    }

    /// Binds and serves until cancellation.
    pub async fn run(&self) -> Result<(), RpcError> {
        let listener = self.bind().await?;
        self.serve(listener).await;
        Ok(())
    }

    /// Serves connections from an already bound listener until cancellation.
    pub async fn serve(&self, listener: TcpListener) {
        let handler = Arc::clone(&self.handler);
        ferry_transfer::serve(
            listener,
            self.config.mode,
            self.cancel.clone(),
            move |stream, peer| {
                let handler = Arc::clone(&handler);
                async move {
                    if let Err(e) = handle_connection(stream, peer, handler.as_ref()).await {
                        tracing::warn!(%peer, error = %e, "call failed");
                    }
                }
            },
        )
        .await;

        tracing::info!("call server stopped");
    }
}

/// Upgrades, runs one call and closes the connection.
async fn handle_connection<H: Handler>(
    stream: TcpStream,
    peer: SocketAddr,
    handler: &H,
) -> Result<(), RpcError> {
    // WebSocket upgrade with size limits matching our protocol constants.
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
    ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
    let ws = accept_async_with_config(stream, Some(ws_config)).await?;
    tracing::debug!(%peer, "WebSocket connection established");

    let mut call = Call::new(ws, Some(peer));
    let result = dispatch(&mut call, handler).await;
    call.close().await;
    result
}

async fn dispatch<H: Handler>(call: &mut Call, handler: &H) -> Result<(), RpcError> {
    let msg = match call.recv().await {
        Ok(Some(Frame::Message(msg))) => msg,
        Ok(Some(Frame::Chunk(_))) => {
            return reject(call, "call must start with a request message").await;
        }
        Ok(None) => {
            tracing::debug!(peer = ?call.peer(), "connection closed before request");
            return Ok(());
        }
        Err(RpcError::Json(e)) => {
            return reject(call, &format!("invalid request: {e}")).await;
        }
        Err(RpcError::Decode(e)) => {
            return reject(call, &format!("invalid request: {e}")).await;
        }
        Err(e) => return Err(e),
    };

    tracing::debug!(peer = ?call.peer(), id = %msg.id, call = %msg.msg_type, "call started");
    match msg.msg_type {
        MessageType::Upload => handler.on_upload(call, msg).await,
        MessageType::Download => handler.on_download(call, msg).await,
        MessageType::List => handler.on_list(call, msg).await,
        MessageType::Delete => handler.on_delete(call, msg).await,
        other => {
            let reason = format!("unexpected message type: {other}");
            tracing::warn!(peer = ?call.peer(), %reason, "rejected call");
            call.send_msg(&msg.reply_error(ErrorKind::MalformedRequest, reason))
                .await
        }
    }
}

async fn reject(call: &mut Call, reason: &str) -> Result<(), RpcError> {
    tracing::warn!(peer = ?call.peer(), %reason, "rejected call");
    call.send_msg(&Message::error("", ErrorKind::MalformedRequest, reason))
        .await
}
