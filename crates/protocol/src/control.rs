//! Socket framing control messages.
//!
//! # Wire format
//!
//! ```text
//! HEADER (Client -> Server):  "<filename>|<size>"   (UTF-8, single write)
//! ACK    (Server -> Client):  "OK" | "ERROR|<reason>"
//! PAYLOAD (Client -> Server): exactly <size> raw bytes
//! RESULT (Server -> Client):  "DONE" | "ERROR|<reason>"
//! ```
//!
//! Messages carry no length prefix: each side writes one message and waits
//! for the peer before writing the next, so a single read sees exactly one.

use crate::error::DecodeError;

const SEPARATOR: char = '|';

/// Upload header sent once before the raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Filename as sent by the client (may still contain directories).
    pub filename: String,
    /// Declared payload size in bytes.
    pub size: i64,
}

impl FileHeader {
    pub fn new(filename: impl Into<String>, size: i64) -> Self {
        Self {
            filename: filename.into(),
            size,
        }
    }

    /// Encodes the header as `name|size`.
    pub fn encode(&self) -> Vec<u8> {
        format!("{}{SEPARATOR}{}", self.filename, self.size).into_bytes()
    }

    /// Decodes a `name|size` header.
    ///
    /// Fails unless the text splits into exactly two fields and the size is a
    /// non-negative integer. An empty filename decodes successfully; callers
    /// decide whether it is acceptable.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
        let mut parts = text.split(SEPARATOR);
        let (Some(filename), Some(size), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(DecodeError::InvalidFormat);
        };

        let size: i64 = size
            .trim()
            .parse()
            .map_err(|_| DecodeError::InvalidSize(size.to_string()))?;
        if size < 0 {
            return Err(DecodeError::InvalidSize(size.to_string()));
        }

        Ok(Self {
            filename: filename.to_string(),
            size,
        })
    }
}

/// Server-to-client reply in the socket framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Header accepted, send the payload.
    Ok,
    /// Payload fully received and stored.
    Done,
    /// Request rejected or transfer failed.
    Error(String),
}

impl Reply {
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error(reason.into())
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Ok => b"OK".to_vec(),
            Self::Done => b"DONE".to_vec(),
            Self::Error(reason) => format!("ERROR{SEPARATOR}{reason}").into_bytes(),
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
        match text {
            "OK" => Ok(Self::Ok),
            "DONE" => Ok(Self::Done),
            _ => match text.split_once(SEPARATOR) {
                Some(("ERROR", reason)) => Ok(Self::Error(reason.to_string())),
                _ => Err(DecodeError::InvalidFormat),
            },
        }
    }
}
