use tokio::io::{AsyncRead, AsyncReadExt};

use ferry_protocol::Chunk;
use ferry_storage::{FileWriter, Storage, StoredFile};

use crate::TransferError;
use crate::session::{Direction, Transfer};

/// Receives one file from a peer into storage.
///
/// Nothing is visible under the target name until [`finish`](Self::finish)
/// succeeds with exactly `total_size` bytes written. Every other exit path
/// ([`abort`](Self::abort), a failed `finish`, or simply dropping the
/// session) removes the partial data.
pub struct UploadSession {
    transfer: Transfer,
    writer: FileWriter,
    chunk_max: usize,
}

impl UploadSession {
    /// Validates the request and opens a fresh destination.
    ///
    /// Rejects empty or invalid filenames and negative sizes before any
    /// file is created.
    pub async fn begin(
        storage: &Storage,
        filename: &str,
        total_size: i64,
        chunk_max: usize,
    ) -> Result<Self, TransferError> {
        if filename.is_empty() {
            return Err(TransferError::Malformed("Filename is required".into()));
        }
        if total_size < 0 {
            return Err(TransferError::Malformed(format!(
                "Invalid file size: {total_size}"
            )));
        }

        let writer = storage.create_writer(filename).await?;
        let transfer = Transfer::new(Direction::Upload, writer.filename(), total_size);
        tracing::debug!(
            filename = %transfer.filename(),
            size = total_size,
            "upload started"
        );

        Ok(Self {
            transfer,
            writer,
            chunk_max: chunk_max.max(1),
        })
    }

    pub fn transfer(&self) -> &Transfer {
        &self.transfer
    }

    pub fn is_complete(&self) -> bool {
        self.transfer.is_complete()
    }

    /// Largest read that cannot overrun the declared size.
    pub fn next_read_len(&self) -> usize {
        self.transfer.remaining().clamp(0, self.chunk_max as i64) as usize
    }

    /// Appends raw payload bytes (socket framing).
    pub async fn write(&mut self, data: &[u8]) -> Result<(), TransferError> {
        if data.len() as i64 > self.transfer.remaining() {
            return Err(TransferError::Malformed(format!(
                "payload exceeds declared size of {} bytes",
                self.transfer.total_size()
            )));
        }
        self.writer.append(data).await?;
        self.transfer.advance(data.len());
        Ok(())
    }

    /// Validates and appends the next chunk (streaming-call framing).
    ///
    /// The chunk must name the same file and size as the request, start
    /// exactly where the previous one ended, stay within `chunk_max`, and
    /// match its checksum if it carries one.
    pub async fn accept(&mut self, chunk: &Chunk) -> Result<(), TransferError> {
        let same_file = ferry_storage::basename(&chunk.filename)
            .map(|name| name == self.transfer.filename())
            .unwrap_or(false);
        if !same_file {
            return Err(TransferError::Malformed(format!(
                "chunk for {:?} in upload of {:?}",
                chunk.filename,
                self.transfer.filename()
            )));
        }
        if chunk.total_size != self.transfer.total_size() {
            return Err(TransferError::Malformed(format!(
                "chunk total size {} differs from declared {}",
                chunk.total_size,
                self.transfer.total_size()
            )));
        }
        if chunk.offset != self.transfer.bytes_moved() {
            return Err(TransferError::Malformed(format!(
                "out-of-order chunk: expected offset {}, got {}",
                self.transfer.bytes_moved(),
                chunk.offset
            )));
        }
        if chunk.data.len() > self.chunk_max {
            return Err(TransferError::Malformed(format!(
                "chunk of {} bytes exceeds maximum of {}",
                chunk.data.len(),
                self.chunk_max
            )));
        }
        if chunk.is_last != (chunk.end_offset() >= chunk.total_size) {
            return Err(TransferError::Malformed(format!(
                "inconsistent last-chunk flag at offset {}",
                chunk.offset
            )));
        }
        if !chunk.verify_checksum() {
            return Err(TransferError::Malformed(format!(
                "checksum mismatch at offset {}",
                chunk.offset
            )));
        }

        self.write(&chunk.data).await
    }

    /// Commits the file if complete; otherwise removes it.
    pub async fn finish(self) -> Result<StoredFile, TransferError> {
        if !self.transfer.is_complete() {
            let err = TransferError::Incomplete {
                received: self.transfer.bytes_moved(),
                expected: self.transfer.total_size(),
            };
            self.writer.discard().await;
            return Err(err);
        }

        let stored = self.writer.commit().await?;
        tracing::info!(
            filename = %stored.filename,
            size = stored.size,
            elapsed_ms = self.transfer.elapsed().as_millis() as u64,
            bytes_per_sec = self.transfer.bytes_per_second() as u64,
            "upload complete"
        );
        Ok(stored)
    }

    /// Abandons the upload, removing any partial data.
    pub async fn abort(self) {
        tracing::debug!(
            filename = %self.transfer.filename(),
            received = self.transfer.bytes_moved(),
            expected = self.transfer.total_size(),
            "upload aborted"
        );
        self.writer.discard().await;
    }
}

/// Drives an upload from a raw byte stream until the declared size is
/// reached or the stream ends.
///
/// Reads at most `chunk_max` bytes at a time and never past the declared
/// size. A stream that ends early yields [`TransferError::Incomplete`];
/// a read error yields [`TransferError::Transport`]. Either way the partial
/// file is removed.
pub async fn receive_from<R: AsyncRead + Unpin>(
    mut session: UploadSession,
    reader: &mut R,
) -> Result<StoredFile, TransferError> {
    let mut buf = vec![0u8; session.chunk_max];

    while !session.is_complete() {
        let want = session.next_read_len();
        let n = match reader.read(&mut buf[..want]).await {
            Ok(n) => n,
            Err(e) => {
                session.abort().await;
                return Err(TransferError::Transport(e.to_string()));
            }
        };
        if n == 0 {
            break;
        }
        if let Err(e) = session.write(&buf[..n]).await {
            session.abort().await;
            return Err(e);
        }
    }

    session.finish().await
}
