use std::time::{Duration, Instant};

/// Direction of a transfer, seen from the storage side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Peer to storage.
    Upload,
    /// Storage to peer.
    Download,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upload => f.write_str("upload"),
            Self::Download => f.write_str("download"),
        }
    }
}

/// Byte accounting for one file moving in one direction.
#[derive(Debug, Clone)]
pub struct Transfer {
    direction: Direction,
    filename: String,
    total_size: i64,
    bytes_moved: i64,
    started_at: Instant,
}

impl Transfer {
    pub fn new(direction: Direction, filename: impl Into<String>, total_size: i64) -> Self {
        Self {
            direction,
            filename: filename.into(),
            total_size,
            bytes_moved: 0,
            started_at: Instant::now(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn total_size(&self) -> i64 {
        self.total_size
    }

    pub fn bytes_moved(&self) -> i64 {
        self.bytes_moved
    }

    /// Bytes still expected before the transfer is complete.
    pub fn remaining(&self) -> i64 {
        self.total_size - self.bytes_moved
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_moved >= self.total_size
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Average speed since the transfer started.
    ///
    /// Returns 0.0 before any time has elapsed.
    pub fn bytes_per_second(&self) -> f64 {
        let elapsed = self.elapsed();
        if elapsed.is_zero() {
            return 0.0;
        }
        self.bytes_moved as f64 / elapsed.as_secs_f64()
    }

    pub(crate) fn advance(&mut self, n: usize) {
        self.bytes_moved += n as i64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_transfer_has_nothing_moved() {
        let t = Transfer::new(Direction::Upload, "a.bin", 10);
        assert_eq!(t.bytes_moved(), 0);
        assert_eq!(t.remaining(), 10);
        assert!(!t.is_complete());
    }

    #[test]
    fn advance_until_complete() {
        let mut t = Transfer::new(Direction::Download, "a.bin", 10);
        t.advance(4);
        assert_eq!(t.remaining(), 6);
        t.advance(6);
        assert!(t.is_complete());
        assert_eq!(t.remaining(), 0);
    }

    #[test]
    fn zero_size_is_complete_immediately() {
        let t = Transfer::new(Direction::Upload, "empty", 0);
        assert!(t.is_complete());
    }

    #[test]
    fn direction_display() {
        assert_eq!(Direction::Upload.to_string(), "upload");
        assert_eq!(Direction::Download.to_string(), "download");
    }
}
