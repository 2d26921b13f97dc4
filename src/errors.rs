use thiserror::Error;

/// Errors surfaced by the snapshot write path.
///
/// Reads never produce these: a missing or corrupt document is treated as
/// "no document" by [`crate::storage::SnapshotStore::load`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Wrapper around IO errors (directory creation, temp file, rename, lock).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapper around JSON serialization errors.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A single normalized snapshot exceeds `storage.max_snapshot_bytes`.
    #[error("snapshot of {size} bytes exceeds the {limit} byte limit")]
    SnapshotTooLarge { size: u64, limit: u64 },

    /// The stored document (or the one about to be written) exceeds the
    /// document limit. The file on disk is left as it was.
    #[error("document of {size} bytes exceeds the {limit} byte limit")]
    DocumentTooLarge { size: u64, limit: u64 },

    /// The blocking writer task panicked or was cancelled.
    #[error("writer task failed: {0}")]
    Task(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
