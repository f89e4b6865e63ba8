//! Cache error types.

use thiserror::Error;

/// Cache error type.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The store could not be opened or created. The durability
    /// guarantee is gone; in-memory-only operation may continue.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A single persist/update/delete failed. Recovered by retrying
    /// the operation on a later queue tick.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Payload serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row could not be reconstructed.
    #[error("invalid row data: {0}")]
    InvalidData(String),
}

/// Result type alias using CacheError.
pub type CacheResult<T> = Result<T, CacheError>;
