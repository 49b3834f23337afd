//! Storage layer error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File already exists: {0:?}")]
    FileExists(PathBuf),

    #[error("File does not exist: {0:?}")]
    FileNotExists(PathBuf),

    #[error("File is not readable and writable: {0:?}")]
    FileCannotRW(PathBuf),

    #[error("Bad log file header")]
    BadLogFileHeader,

    #[error("Memory budget too small: {capacity} pages (min: {min})")]
    MemTooSmall { capacity: usize, min: usize },

    #[error("Cache is full: {capacity} entries resident")]
    CacheFull { capacity: usize },

    #[error("Page {pgno} out of range (allocated: {allocated})")]
    PageOutOfRange { pgno: u32, allocated: u32 },

    #[error("Invalid page data: expected {expected} bytes, got {actual}")]
    InvalidPageData { expected: usize, actual: usize },

    #[error("Page numbers exhausted: page {last} was the last one issued")]
    PageNumbersExhausted { last: u32 },

    #[error("Release of key {0} that is not held")]
    NotHeld(u64),

    #[error("Page cache is closed")]
    CacheClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Only a full cache can be retried after the caller releases pressure.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::CacheFull { .. })
    }

    /// Setup, corruption and I/O failures mean on-disk state can no longer be
    /// trusted; the embedding engine is expected to stop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::FileExists(_)
                | Self::FileNotExists(_)
                | Self::FileCannotRW(_)
                | Self::BadLogFileHeader
                | Self::MemTooSmall { .. }
                | Self::PageNumbersExhausted { .. }
                | Self::Io(_)
        )
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
