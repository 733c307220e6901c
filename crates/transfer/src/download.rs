use ferry_protocol::Chunk;
use ferry_storage::{FileReader, Storage};

use crate::TransferError;
use crate::session::{Direction, Transfer};

/// Produces the chunks of one stored file, in order.
///
/// The file size is captured when the reader opens. Chunks are contiguous,
/// at most `chunk_max` bytes each, and the final one has `is_last` set. An
/// empty file yields exactly one empty chunk.
pub struct ChunkReader {
    reader: FileReader,
    transfer: Transfer,
    chunk_max: usize,
    done: bool,
}

impl ChunkReader {
    pub async fn open(
        storage: &Storage,
        filename: &str,
        chunk_max: usize,
    ) -> Result<Self, TransferError> {
        let reader = storage.open_reader(filename).await?;
        let transfer = Transfer::new(
            Direction::Download,
            reader.filename(),
            reader.size() as i64,
        );
        tracing::debug!(
            filename = %transfer.filename(),
            size = transfer.total_size(),
            "download started"
        );
        Ok(Self {
            reader,
            transfer,
            chunk_max: chunk_max.max(1),
            done: false,
        })
    }

    pub fn transfer(&self) -> &Transfer {
        &self.transfer
    }

    pub fn total_size(&self) -> i64 {
        self.transfer.total_size()
    }

    /// Reads the next chunk, or `None` once the last chunk was returned.
    ///
    /// A file that shrinks while being read fails with an unexpected-EOF
    /// I/O error instead of producing a short download.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        if self.done {
            return Ok(None);
        }

        let offset = self.transfer.bytes_moved();
        let total = self.transfer.total_size();
        let want = self.transfer.remaining().clamp(0, self.chunk_max as i64) as usize;

        let data = if want == 0 {
            Vec::new()
        } else {
            let data = self.reader.read_chunk(want).await?;
            if data.is_empty() {
                return Err(TransferError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!(
                        "{} ended at {offset} of {total} bytes",
                        self.transfer.filename()
                    ),
                )));
            }
            data
        };

        self.transfer.advance(data.len());
        let chunk = Chunk::new(self.transfer.filename(), data, offset, total).with_checksum();
        if chunk.is_last {
            self.done = true;
            tracing::info!(
                filename = %self.transfer.filename(),
                size = total,
                elapsed_ms = self.transfer.elapsed().as_millis() as u64,
                "download complete"
            );
        }
        Ok(Some(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ferry_protocol::ErrorKind;

    async fn storage_with(name: &str, content: &[u8]) -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).await.unwrap();
        std::fs::write(storage.resolve(name).unwrap(), content).unwrap();
        (dir, storage)
    }

    async fn collect(reader: &mut ChunkReader) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        while let Some(chunk) = reader.next_chunk().await.unwrap() {
            chunks.push(chunk);
        }
        chunks
    }

    #[tokio::test]
    async fn chunks_are_contiguous() {
        let content: Vec<u8> = (0..10_000u32).map(|i| (i % 256) as u8).collect();
        let (_dir, storage) = storage_with("data.bin", &content).await;

        let mut reader = ChunkReader::open(&storage, "data.bin", 4096).await.unwrap();
        let chunks = collect(&mut reader).await;

        assert_eq!(chunks.len(), 3);
        let mut expected_offset = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.offset, expected_offset);
            assert_eq!(chunk.total_size, 10_000);
            assert!(chunk.data.len() <= 4096);
            assert!(chunk.verify_checksum());
            assert_eq!(chunk.is_last, i == chunks.len() - 1);
            expected_offset = chunk.end_offset();
        }
        assert_eq!(expected_offset, 10_000);

        let joined: Vec<u8> = chunks.into_iter().flat_map(|c| c.data).collect();
        assert_eq!(joined, content);
    }

    #[tokio::test]
    async fn exact_multiple_has_no_trailing_empty_chunk() {
        let (_dir, storage) = storage_with("f", &[7u8; 8]).await;
        let mut reader = ChunkReader::open(&storage, "f", 4).await.unwrap();
        let chunks = collect(&mut reader).await;
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].is_last);
        assert_eq!(chunks[1].data.len(), 4);
    }

    #[tokio::test]
    async fn empty_file_yields_single_last_chunk() {
        let (_dir, storage) = storage_with("empty", b"").await;
        let mut reader = ChunkReader::open(&storage, "empty", 4096).await.unwrap();

        let chunk = reader.next_chunk().await.unwrap().unwrap();
        assert!(chunk.data.is_empty());
        assert!(chunk.is_last);
        assert_eq!(chunk.offset, 0);
        assert_eq!(chunk.total_size, 0);
        assert!(reader.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).await.unwrap();
        let Err(err) = ChunkReader::open(&storage, "absent", 4096).await else {
            panic!("absent file opened");
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn traversal_name_reads_basename() {
        let (_dir, storage) = storage_with("inside.txt", b"ok").await;
        let mut reader = ChunkReader::open(&storage, "../../inside.txt", 4096)
            .await
            .unwrap();
        let chunk = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(chunk.filename, "inside.txt");
        assert_eq!(chunk.data, b"ok");
    }

    #[tokio::test]
    async fn file_shrinking_mid_read_is_an_error() {
        let (_dir, storage) = storage_with("shrink", &[1u8; 16]).await;
        let mut reader = ChunkReader::open(&storage, "shrink", 8).await.unwrap();
        reader.next_chunk().await.unwrap().unwrap();

        std::fs::OpenOptions::new()
            .write(true)
            .open(storage.resolve("shrink").unwrap())
            .unwrap()
            .set_len(8)
            .unwrap();

        let err = reader.next_chunk().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
    }
}
