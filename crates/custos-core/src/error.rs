//! Core error types.

use thiserror::Error;

/// Errors raised while parsing or validating core types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Unknown key purpose name.
    #[error("unknown key purpose: {0} (expected data, backup or transit)")]
    UnknownPurpose(String),

    /// Actor identifiers must not be empty.
    #[error("actor id must not be empty")]
    EmptyActor,
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
