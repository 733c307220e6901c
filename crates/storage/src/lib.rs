//! Sandboxed storage for transferred files.
//!
//! Every file lives directly under a single root directory. Callers only
//! ever hand in logical names; [`Storage::resolve`] reduces them to a
//! basename so no operation can reach outside the root.

mod file;
mod resolve;
mod store;

pub use file::{FileReader, FileWriter};
pub use resolve::{PARTIAL_PREFIX, basename};
pub use store::{DeleteOutcome, Storage, StoredFile};

/// Errors produced by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid filename: {0}")]
    InvalidName(String),

    #[error("file not found: {0}")]
    NotFound(String),
}
