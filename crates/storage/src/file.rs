//! Handles for writing and reading stored files.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::StorageError;
use crate::store::StoredFile;

/// Write handle for a file being uploaded.
///
/// Bytes go to a staging file next to the target; the target name only
/// changes on [`commit`](Self::commit). A writer that is discarded or
/// dropped removes its staging file, so a failed upload never leaves a
/// truncated file under its final name.
pub struct FileWriter {
    file: Option<tokio::fs::File>,
    filename: String,
    staging: PathBuf,
    target: PathBuf,
    written: u64,
    finished: bool,
}

impl FileWriter {
    pub(crate) async fn create(
        filename: String,
        staging: PathBuf,
        target: PathBuf,
    ) -> Result<Self, StorageError> {
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&staging)
            .await?;
        Ok(Self {
            file: Some(file),
            filename,
            staging,
            target,
            written: 0,
            finished: false,
        })
    }

    /// Appends `data` at the current end of the file.
    pub async fn append(&mut self, data: &[u8]) -> Result<(), StorageError> {
        let Some(file) = self.file.as_mut() else {
            return Err(closed_error());
        };
        file.write_all(data).await?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Bytes appended so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Basename the file will be stored under.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Flushes, syncs and atomically moves the file to its final name.
    ///
    /// Replaces any existing file with the same name.
    pub async fn commit(mut self) -> Result<StoredFile, StorageError> {
        let Some(mut file) = self.file.take() else {
            return Err(closed_error());
        };
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        // On failure, Drop removes the staging file.
        tokio::fs::rename(&self.staging, &self.target).await?;
        self.finished = true;

        let metadata = tokio::fs::metadata(&self.target).await?;
        tracing::debug!(
            filename = %self.filename,
            size = metadata.len(),
            "file committed"
        );
        Ok(StoredFile::from_metadata(self.filename.clone(), &metadata))
    }

    /// Drops the partial content without touching the final name.
    pub async fn discard(mut self) {
        self.file.take();
        self.finished = true;
        match tokio::fs::remove_file(&self.staging).await {
            Ok(()) => {
                tracing::debug!(filename = %self.filename, "partial upload discarded");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    path = %self.staging.display(),
                    error = %e,
                    "failed to remove partial upload"
                );
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn staging_path(&self) -> &Path {
        &self.staging
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.file.take();
        if let Err(e) = std::fs::remove_file(&self.staging) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %self.staging.display(),
                    error = %e,
                    "failed to remove abandoned partial upload"
                );
            }
        }
    }
}

fn closed_error() -> StorageError {
    StorageError::Io(std::io::Error::other("file handle already closed"))
}

/// Read handle for a stored file.
///
/// The size is captured once when the file is opened.
pub struct FileReader {
    file: tokio::fs::File,
    filename: String,
    size: u64,
}

impl FileReader {
    pub(crate) async fn open(filename: String, path: &Path) -> Result<Self, StorageError> {
        let file = match tokio::fs::File::open(path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(filename));
            }
            Err(e) => return Err(e.into()),
        };
        let size = file.metadata().await?.len();
        Ok(Self {
            file,
            filename,
            size,
        })
    }

    /// Reads up to `max_len` bytes. An empty result means end of file.
    pub async fn read_chunk(&mut self, max_len: usize) -> Result<Vec<u8>, StorageError> {
        let mut buf = vec![0u8; max_len];
        let mut filled = 0;
        while filled < max_len {
            let n = self.file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Size observed when the file was opened.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }
}
