use sha2::{Digest, Sha256};

/// One bounded slice of a file plus its position in the transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Basename of the file being transferred.
    pub filename: String,
    /// Raw chunk data.
    pub data: Vec<u8>,
    /// Byte position of `data[0]` within the file.
    pub offset: i64,
    /// Size of the whole file, fixed for the transfer.
    pub total_size: i64,
    /// True iff `offset + data.len() >= total_size`.
    pub is_last: bool,
    /// SHA-256 hex checksum of `data` (empty means no verification).
    pub checksum: String,
}

impl Chunk {
    /// Builds a chunk, deriving `is_last` from the position.
    pub fn new(filename: impl Into<String>, data: Vec<u8>, offset: i64, total_size: i64) -> Self {
        let mut chunk = Self {
            filename: filename.into(),
            data,
            offset,
            total_size,
            is_last: false,
            checksum: String::new(),
        };
        chunk.is_last = chunk.end_offset() >= total_size;
        chunk
    }

    /// Attaches the SHA-256 checksum of the payload.
    pub fn with_checksum(mut self) -> Self {
        self.checksum = checksum_bytes(&self.data);
        self
    }

    /// Offset of the byte following this chunk, saturating at `i64::MAX`.
    pub fn end_offset(&self) -> i64 {
        let len = i64::try_from(self.data.len()).unwrap_or(i64::MAX);
        self.offset.saturating_add(len)
    }

    /// Returns `false` if a checksum is present and does not match the payload.
    pub fn verify_checksum(&self) -> bool {
        self.checksum.is_empty() || checksum_bytes(&self.data) == self.checksum
    }
}

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_last_derived_from_position() {
        assert!(!Chunk::new("f", vec![0; 4], 0, 10).is_last);
        assert!(Chunk::new("f", vec![0; 4], 6, 10).is_last);
        assert!(Chunk::new("f", Vec::new(), 0, 0).is_last);
    }

    #[test]
    fn end_offset_advances_by_payload() {
        let c = Chunk::new("f", b"abc".to_vec(), 7, 10);
        assert_eq!(c.end_offset(), 10);
    }

    #[test]
    fn end_offset_saturates() {
        let c = Chunk::new("f", b"x".to_vec(), i64::MAX, i64::MAX);
        assert_eq!(c.end_offset(), i64::MAX);
        assert!(c.is_last);
    }

    #[test]
    fn checksum_verification() {
        let c = Chunk::new("f", b"payload".to_vec(), 0, 7).with_checksum();
        assert_eq!(c.checksum.len(), 64);
        assert!(c.verify_checksum());

        let tampered = Chunk {
            data: b"PAYLOAD".to_vec(),
            ..c
        };
        assert!(!tampered.verify_checksum());
    }

    #[test]
    fn empty_checksum_always_verifies() {
        let c = Chunk::new("f", b"x".to_vec(), 0, 1);
        assert!(c.verify_checksum());
    }
}
