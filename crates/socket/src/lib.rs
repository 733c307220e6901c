//! Socket framing: uploads over a raw TCP connection.
//!
//! One connection carries one upload. The client sends a `name|size`
//! header, waits for `OK`, streams exactly `size` bytes and reads the
//! final `DONE` or `ERROR|<reason>`. See [`ferry_protocol::control`] for
//! the wire format.

pub mod client;
pub mod error;
pub mod server;

pub use client::SocketClient;
pub use error::SocketError;
pub use server::{SocketServer, SocketServerConfig};

use std::time::Duration;

/// Default listening port.
pub const DEFAULT_SOCKET_PORT: u16 = 8080;

/// Timeout for the client's TCP connection attempt.
pub const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
