//! Storage error types.

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend at `path` could not be opened.
    #[error("failed to open store at {path}: {reason}")]
    Open {
        /// Directory of the store.
        path: String,
        /// Backend message.
        reason: String,
    },

    /// A read, write or commit failed.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The namespace or key cannot be stored.
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
