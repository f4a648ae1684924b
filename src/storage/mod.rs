//! Local persistence for extracted content

use crate::ContentRecord;

pub mod sqlite;

pub use sqlite::{SqliteStore, SqliteWriter};

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Underlying database error
    #[error("database error: {0}")]
    Database(String),

    /// Write lock could not be acquired within the retry budget
    #[error("database busy after {attempts} attempts: {message}")]
    Busy {
        /// Number of attempts made before giving up
        attempts: u32,
        /// Last error reported by the database
        message: String,
    },

    /// Record failed validation before write
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Filesystem error opening or creating the database
    #[error("I/O error: {0}")]
    Io(String),
}

impl StorageError {
    /// Whether this error should terminate the worker instead of being
    /// skipped as a per-item failure.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StorageError::Busy { .. })
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Handle for writing content from a single worker thread.
///
/// Each worker owns exactly one writer; the connection it wraps is
/// released when the writer is dropped.
pub trait ContentWriter: Send {
    /// Persist one record, replacing any previous copy with the same
    /// content type and id.
    fn save_content(&mut self, record: &ContentRecord) -> StorageResult<()>;
}

/// Factory for per-worker writer handles.
///
/// Implementations must be safe to share across worker threads; the
/// writers they hand out are not.
pub trait ContentSink: Send + Sync {
    /// Open a new writer backed by its own connection.
    fn open_writer(&self) -> StorageResult<Box<dyn ContentWriter>>;
}
