//! Streaming-call framing over WebSocket.
//!
//! One call per connection. The client opens with a JSON envelope whose
//! `type` selects the operation (`upload`, `download`, `list`, `delete`);
//! file content travels as binary chunk frames in either direction. The
//! server answers through a [`Handler`] and closes the connection.

mod call;
pub mod client;
mod handler;
mod server;

pub use call::{Call, Frame};
pub use client::RpcClient;
pub use handler::{Handler, HandlerFuture, StorageHandler};
pub use server::{RpcServer, RpcServerConfig};

use std::time::Duration;

use ferry_protocol::{DecodeError, ErrorKind};
use ferry_transfer::TransferError;

/// Default listening port.
pub const DEFAULT_RPC_PORT: u16 = 50051;

/// Timeout for the client's TCP connect and WebSocket handshake.
pub const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a closing side keeps reading while waiting for the peer's close.
pub const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Error code for operations a handler does not implement.
pub const NOT_IMPLEMENTED: i32 = 501;

/// Errors produced by the call server and client.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid chunk frame: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// The peer answered with an error envelope or an unsuccessful result.
    #[error("server error {code}: {message}")]
    Remote { code: i32, message: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection closed")]
    Closed,

    #[error("connection timed out")]
    Timeout,
}

impl RpcError {
    /// Failure class, as seen by the caller.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::IoFailure,
            Self::WebSocket(_) | Self::Closed | Self::Timeout => ErrorKind::TransportFailure,
            Self::Json(_) | Self::Decode(_) | Self::Protocol(_) => ErrorKind::MalformedRequest,
            Self::Transfer(e) => e.kind(),
            Self::Remote { code, .. } => ErrorKind::from_code(*code),
        }
    }
}
