use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::StorageError;
use crate::file::{FileReader, FileWriter};
use crate::resolve::{PARTIAL_PREFIX, basename};

/// A regular file stored under the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub filename: String,
    pub size: u64,
    pub modified: SystemTime,
}

impl StoredFile {
    pub(crate) fn from_metadata(filename: String, metadata: &std::fs::Metadata) -> Self {
        Self {
            filename,
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(UNIX_EPOCH),
        }
    }

    /// Modification time as Unix seconds (0 if before the epoch).
    pub fn modified_unix(&self) -> i64 {
        self.modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Sandboxed file store rooted at a single directory.
///
/// Cloning is cheap; clones share the same root. The store keeps no
/// in-memory index: the directory itself is the namespace.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Opens (creating if needed) the storage root.
    ///
    /// Staging files left over from an interrupted process are removed.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref();
        tokio::fs::create_dir_all(root).await?;
        let root = tokio::fs::canonicalize(root).await?;
        let storage = Self { root };

        let swept = storage.sweep_partials().await?;
        if swept > 0 {
            tracing::info!(swept, "removed stale partial uploads");
        }
        tracing::debug!(root = %storage.root.display(), "storage opened");
        Ok(storage)
    }

    /// Canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a logical name to its path inside the root.
    ///
    /// Only the basename of `name` is used, so the result is always a
    /// direct child of the root.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(basename(name)?))
    }

    /// Opens a fresh writer for `name` (truncate-or-create on commit).
    pub async fn create_writer(&self, name: &str) -> Result<FileWriter, StorageError> {
        let filename = basename(name)?.to_string();
        let target = self.root.join(&filename);
        let staging = self
            .root
            .join(format!("{PARTIAL_PREFIX}{}", uuid::Uuid::new_v4().simple()));
        FileWriter::create(filename, staging, target).await
    }

    /// Opens `name` for chunked reading.
    pub async fn open_reader(&self, name: &str) -> Result<FileReader, StorageError> {
        let stored = self.stat(name).await?;
        let path = self.root.join(&stored.filename);
        FileReader::open(stored.filename, &path).await
    }

    /// Returns size and modification time of `name`.
    ///
    /// Only regular files count; symlinks and directories report `NotFound`.
    pub async fn stat(&self, name: &str) -> Result<StoredFile, StorageError> {
        let filename = basename(name)?.to_string();
        let path = self.root.join(&filename);
        match tokio::fs::symlink_metadata(&path).await {
            Ok(m) if m.is_file() => Ok(StoredFile::from_metadata(filename, &m)),
            Ok(_) => Err(StorageError::NotFound(filename)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(filename))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Lists every regular file directly under the root, sorted by name.
    pub async fn list(&self) -> Result<Vec<StoredFile>, StorageError> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(PARTIAL_PREFIX) {
                continue;
            }
            // Entries may vanish between read_dir and metadata.
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !metadata.is_file() {
                continue;
            }
            files.push(StoredFile::from_metadata(name, &metadata));
        }

        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(files)
    }

    /// Deletes `name` if it is a stored regular file.
    pub async fn delete(&self, name: &str) -> Result<DeleteOutcome, StorageError> {
        let path = match self.stat(name).await {
            Ok(stored) => self.root.join(stored.filename),
            Err(StorageError::NotFound(_)) => return Ok(DeleteOutcome::NotFound),
            Err(e) => return Err(e),
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), "file deleted");
                Ok(DeleteOutcome::Deleted)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DeleteOutcome::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes staging files; returns how many were deleted.
    async fn sweep_partials(&self) -> Result<u32, StorageError> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut swept = 0u32;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_name().to_string_lossy().starts_with(PARTIAL_PREFIX) {
                continue;
            }
            if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                tracing::warn!(file = %entry.path().display(), error = %e, "failed to remove stale partial upload");
            } else {
                swept += 1;
            }
        }
        Ok(swept)
    }
}
