//! Error types for the socket framing.

use ferry_protocol::DecodeError;

/// Errors produced by the socket server and client.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed reply: {0}")]
    Decode(#[from] DecodeError),

    #[error("server rejected transfer: {0}")]
    Rejected(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection timed out")]
    Timeout,
}
