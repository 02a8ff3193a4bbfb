//! Runtime error types.

use custos_audit::AuditError;
use custos_config::ConfigError;
use custos_core::CoreError;
use custos_crypto::CryptoError;
use custos_keys::KeyError;
use custos_storage::StorageError;
use custos_telemetry::TelemetryError;
use thiserror::Error;

/// Errors raised while bootstrapping or operating the subsystem.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration could not be loaded or converted.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Logging could not be set up.
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    /// Key lifecycle or field encryption failure.
    #[error("key error: {0}")]
    Key(#[from] KeyError),

    /// Audit ledger failure.
    #[error("audit error: {0}")]
    Audit(#[from] AuditError),

    /// Secret bootstrap or primitive failure.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Storage backend could not be opened.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Invalid identifier or enum value.
    #[error("invalid value: {0}")]
    Core(#[from] CoreError),

    /// An administrative operation was refused because its audit entry
    /// could not be written.
    #[error("{operation} refused: audit entry could not be written: {source}")]
    AuditUnavailable {
        /// Operation that was refused or rolled back.
        operation: &'static str,
        /// Why the ledger rejected the entry.
        #[source]
        source: AuditError,
    },

    /// A background task panicked or was cancelled.
    #[error("task {task} did not complete: {reason}")]
    Task {
        /// Task name.
        task: &'static str,
        /// Join failure.
        reason: String,
    },
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
