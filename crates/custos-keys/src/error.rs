//! Key management error types.

use custos_core::{KeyPurpose, Timestamp};
use custos_crypto::CryptoError;
use custos_storage::StorageError;
use thiserror::Error;

/// Errors raised by the key manager and the field cipher.
#[derive(Debug, Error)]
pub enum KeyError {
    /// No such key, or its material has been purged.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// The ciphertext, tag or associated data did not authenticate.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The active key has not reached its rotation interval.
    #[error("rotation of {purpose} key not due until {due_at}")]
    RotationNotDue {
        /// Purpose whose rotation was requested.
        purpose: KeyPurpose,
        /// When the active key becomes due.
        due_at: Timestamp,
    },

    /// The purpose's policy requires an approver.
    #[error("rotation of {purpose} key requires approval")]
    ApprovalRequired {
        /// Purpose whose rotation was requested.
        purpose: KeyPurpose,
    },

    /// An import collided with an existing key id.
    #[error("key already exists: {0}")]
    KeyAlreadyExists(String),

    /// A purged key cannot be activated or exported.
    #[error("key material has been purged: {0}")]
    KeyPurged(String),

    /// A rotation policy failed validation.
    #[error("invalid rotation policy: {0}")]
    InvalidPolicy(String),

    /// Export/import password below the minimum length.
    #[error("password too weak: at least {min_len} characters required")]
    WeakPassword {
        /// Minimum accepted length in characters.
        min_len: usize,
    },

    /// Payload names an algorithm other than AES-256-GCM.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Payload fields could not be decoded.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Export blob could not be parsed.
    #[error("invalid key export: {0}")]
    InvalidExport(String),

    /// The durable store rejected a write; in-memory state is unchanged.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// Lower-level cryptographic failure.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Internal error (poisoned lock).
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for KeyError {
    fn from(e: StorageError) -> Self {
        Self::PersistenceFailure(e.to_string())
    }
}

/// Result type for key operations.
pub type KeyResult<T> = Result<T, KeyError>;
