//! Telemetry setup errors.

use std::path::PathBuf;

/// Why logging could not be installed.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// A level, directive, format or rotation name was not understood.
    #[error("invalid logging setting: {0}")]
    InvalidSetting(String),

    /// The log directory could not be created or opened.
    #[error("log directory {}: {source}", path.display())]
    LogDirectory {
        /// Directory that was requested.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// Another global subscriber is already installed, or the appender failed.
    #[error("cannot install subscriber: {0}")]
    Install(String),
}

/// Result alias for this crate.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
