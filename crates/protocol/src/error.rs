//! Error types shared across framings.

/// Error produced when a wire unit cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid request format")]
    InvalidFormat,

    #[error("invalid file size: {0}")]
    InvalidSize(String),

    #[error("invalid UTF-8 in control message")]
    InvalidUtf8,

    #[error("frame too short (need at least 4 bytes)")]
    TooShort,

    #[error("header truncated: expected {expected} bytes, got {got}")]
    HeaderTruncated { expected: usize, got: usize },

    #[error("invalid header JSON: {0}")]
    InvalidJson(String),

    #[error("inconsistent chunk: {0}")]
    Inconsistent(String),
}

/// Peer-visible failure classes.
///
/// Every failure a handler reports maps onto exactly one of these; the
/// numeric [`code`](Self::code) is what travels in the call envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unparseable or invalid request (bad header, bad filename, bad chunk).
    MalformedRequest,
    /// Download or delete of an absent file.
    NotFound,
    /// Peer stopped before the declared size was reached.
    IncompleteTransfer,
    /// Local disk failure (disk full, permission denied, ...).
    IoFailure,
    /// Connection reset or closed underneath the session.
    TransportFailure,
}

impl ErrorKind {
    /// Numeric code carried in [`WsError`](crate::WsError).
    pub fn code(&self) -> i32 {
        match self {
            Self::MalformedRequest => 400,
            Self::NotFound => 404,
            Self::IncompleteTransfer => 409,
            Self::IoFailure => 500,
            Self::TransportFailure => 502,
        }
    }

    /// Inverse of [`code`](Self::code); unknown codes map to `IoFailure`.
    pub fn from_code(code: i32) -> Self {
        match code {
            400 => Self::MalformedRequest,
            404 => Self::NotFound,
            409 => Self::IncompleteTransfer,
            502 => Self::TransportFailure,
            _ => Self::IoFailure,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MalformedRequest => "malformed request",
            Self::NotFound => "not found",
            Self::IncompleteTransfer => "incomplete transfer",
            Self::IoFailure => "I/O failure",
            Self::TransportFailure => "transport failure",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_roundtrip() {
        for kind in [
            ErrorKind::MalformedRequest,
            ErrorKind::NotFound,
            ErrorKind::IncompleteTransfer,
            ErrorKind::IoFailure,
            ErrorKind::TransportFailure,
        ] {
            assert_eq!(ErrorKind::from_code(kind.code()), kind);
        }
    }

    #[test]
    fn unknown_code_is_io_failure() {
        assert_eq!(ErrorKind::from_code(418), ErrorKind::IoFailure);
    }
}
