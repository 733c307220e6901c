//! Wire types shared by the Ferry server and its clients.
//!
//! Two framings are defined here:
//!
//! - [`control`]: the socket framing's `name|size` header and its text replies.
//! - [`binary`] + [`envelope`]: the streaming-call framing, where JSON envelope
//!   messages select the call and binary frames carry [`Chunk`]s.

pub mod binary;
pub mod chunk;
pub mod constants;
pub mod control;
pub mod envelope;
pub mod error;
pub mod messages;

// Re-export primary types for convenience.
pub use binary::{ChunkHeader, decode_chunk, encode_chunk};
pub use chunk::{Chunk, checksum_bytes};
pub use constants::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MessageType};
pub use control::{FileHeader, Reply};
pub use envelope::{Message, WsError};
pub use error::{DecodeError, ErrorKind};
