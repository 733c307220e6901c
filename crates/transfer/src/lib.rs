//! Transfer sessions: moving one file's bytes in one direction.
//!
//! - [`UploadSession`] accepts bytes or [`Chunk`](ferry_protocol::Chunk)s and
//!   only makes the file visible once exactly `total_size` bytes arrived.
//! - [`ChunkReader`] produces contiguous chunks of a stored file on demand.
//! - [`dispatch`] hands accepted connections to per-connection handlers.

pub mod dispatch;
mod download;
mod session;
mod upload;

pub use dispatch::{DispatchMode, serve};
pub use download::ChunkReader;
pub use session::{Direction, Transfer};
pub use upload::{UploadSession, receive_from};

use ferry_protocol::ErrorKind;
use ferry_storage::StorageError;

/// Reason reported to the peer when it stops before the declared size.
pub const INCOMPLETE_REASON: &str = "Incomplete transfer";

/// Errors produced by a transfer session.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Malformed(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("Incomplete transfer ({received}/{expected} bytes)")]
    Incomplete { received: i64, expected: i64 },

    #[error("transport error: {0}")]
    Transport(String),
}

impl TransferError {
    /// Peer-visible failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::IoFailure,
            Self::Malformed(_) => ErrorKind::MalformedRequest,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Incomplete { .. } => ErrorKind::IncompleteTransfer,
            Self::Transport(_) => ErrorKind::TransportFailure,
        }
    }

    /// Human-readable reason sent to the peer. Never empty.
    pub fn reason(&self) -> String {
        match self {
            Self::Incomplete { .. } => INCOMPLETE_REASON.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StorageError> for TransferError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Io(e) => Self::Io(e),
            StorageError::InvalidName(msg) => Self::Malformed(format!("invalid filename: {msg}")),
            StorageError::NotFound(name) => Self::NotFound(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_reason_is_stable() {
        let err = TransferError::Incomplete {
            received: 3,
            expected: 10,
        };
        assert_eq!(err.reason(), "Incomplete transfer");
        assert_eq!(err.to_string(), "Incomplete transfer (3/10 bytes)");
        assert_eq!(err.kind(), ErrorKind::IncompleteTransfer);
    }

    #[test]
    fn storage_errors_map_to_kinds() {
        let not_found: TransferError = StorageError::NotFound("a".into()).into();
        assert_eq!(not_found.kind(), ErrorKind::NotFound);
        assert_eq!(not_found.reason(), "file not found: a");

        let invalid: TransferError = StorageError::InvalidName("empty".into()).into();
        assert_eq!(invalid.kind(), ErrorKind::MalformedRequest);

        let io: TransferError =
            StorageError::Io(std::io::Error::other("disk full")).into();
        assert_eq!(io.kind(), ErrorKind::IoFailure);
    }
}
