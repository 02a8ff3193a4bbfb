//! Ledger errors.

/// Failure of a ledger, baseline or investigation operation.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The entry could not be written; no sequence number was consumed.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// A stored record could not be encoded or decoded.
    #[error("record encoding: {0}")]
    Serialization(String),

    /// No entry with that sequence number.
    #[error("no ledger entry #{sequence}")]
    EntryNotFound {
        /// Requested sequence number.
        sequence: u64,
    },

    /// The hash chain is broken.
    #[error("hash chain broken at #{sequence}: {reason}")]
    ChainIntegrityViolation {
        /// Earliest sequence number shown to be tampered with.
        sequence: u64,
        /// What did not match.
        reason: String,
    },

    /// The HMAC on an entry does not verify.
    #[error("bad signature on ledger entry #{sequence}")]
    InvalidSignature {
        /// Entry whose signature failed.
        sequence: u64,
    },

    /// Storage refused to overwrite an existing entry.
    #[error("ledger entry #{sequence} is already written")]
    EntryAlreadyExists {
        /// The sequence number already taken.
        sequence: u64,
    },

    /// An alert could not be delivered.
    #[error("notification failed: {0}")]
    Notification(String),

    /// Hashing or signing failed.
    #[error(transparent)]
    Crypto(#[from] custos_crypto::CryptoError),

    /// Poisoned lock or exhausted sequence space.
    #[error("ledger internal error: {0}")]
    Internal(String),
}

impl From<custos_storage::StorageError> for AuditError {
    fn from(e: custos_storage::StorageError) -> Self {
        match e {
            custos_storage::StorageError::Serialization(msg) => Self::Serialization(msg),
            other => Self::PersistenceFailure(other.to_string()),
        }
    }
}

/// Result alias for this crate.
pub type AuditResult<T> = Result<T, AuditError>;
