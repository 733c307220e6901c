use serde::{Deserialize, Serialize};

/// Default maximum chunk payload (4 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Maximum size of a socket-framing control message or reply.
pub const CONTROL_MAX_LEN: usize = 1024;

/// Maximum WebSocket message size accepted by either side (16 MiB).
///
/// Chunk frames are bounded by the configured chunk size; this only caps
/// what a misbehaving peer can make us buffer.
pub const WS_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Room left in a chunk frame for the length prefix and JSON header.
pub const CHUNK_HEADER_HEADROOM: usize = 64 * 1024;

/// Largest chunk payload that still fits in one WebSocket message.
pub const MAX_CHUNK_SIZE: usize = WS_MAX_MESSAGE_SIZE - CHUNK_HEADER_HEADROOM;

/// Call envelope message type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    // Calls from client to server
    #[serde(rename = "upload")]
    Upload,
    #[serde(rename = "upload_end")]
    UploadEnd,
    #[serde(rename = "download")]
    Download,
    #[serde(rename = "list")]
    List,
    #[serde(rename = "delete")]
    Delete,

    // Responses from server to client
    #[serde(rename = "upload_result")]
    UploadResult,
    #[serde(rename = "file_list")]
    FileList,
    #[serde(rename = "delete_result")]
    DeleteResult,
    #[serde(rename = "error")]
    Error,
}

impl MessageType {
    /// Wire name of this message type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::UploadEnd => "upload_end",
            Self::Download => "download",
            Self::List => "list",
            Self::Delete => "delete",
            Self::UploadResult => "upload_result",
            Self::FileList => "file_list",
            Self::DeleteResult => "delete_result",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
