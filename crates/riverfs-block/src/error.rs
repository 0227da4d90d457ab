//! Error types for block store operations.

use thiserror::Error;

/// Result type alias for block store operations.
pub type BlockResult<T> = Result<T, BlockError>;

/// Error variants for block store operations.
#[derive(Debug, Error)]
pub enum BlockError {
    /// The requested block hash does not exist in the store.
    #[error("block {0} not found")]
    BlockNotFound(String),

    /// Wraps I/O errors from the byte stream being ingested.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
