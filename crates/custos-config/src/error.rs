//! Errors raised while loading configuration.

use std::io;
use std::path::Path;

/// Why a configuration could not be produced.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A config file exists but could not be read, or an explicit file is missing.
    #[error("cannot read {path}: {source}")]
    Read {
        /// File that was being read.
        path: String,
        /// I/O failure.
        #[source]
        source: io::Error,
    },

    /// TOML syntax error, or a merged tree that does not fit [`crate::Config`].
    #[error("cannot parse {origin}: {source}")]
    Parse {
        /// File path, or a marker such as `<merged config>`.
        origin: String,
        /// Parser failure.
        #[source]
        source: toml::de::Error,
    },

    /// A config file over the size limit.
    #[error("{path} is {size} bytes, over the {limit} byte limit")]
    TooLarge {
        /// Offending file.
        path: String,
        /// Actual size.
        size: u64,
        /// Allowed size.
        limit: u64,
    },

    /// A value was well-formed but out of range.
    #[error("invalid value for '{field}': {message}")]
    Invalid {
        /// Dotted field path.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// No home directory to look for the user layer in.
    #[error("no home directory; pass an explicit home_dir")]
    HomeUnknown,
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.to_owned(),
            message: message.into(),
        }
    }

    pub(crate) fn missing(path: &Path) -> Self {
        Self::Read {
            path: path.display().to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "config file not found"),
        }
    }

    pub(crate) fn parse(origin: impl Into<String>, source: toml::de::Error) -> Self {
        Self::Parse {
            origin: origin.into(),
            source,
        }
    }
}

/// Result alias for this crate.
pub type ConfigResult<T> = Result<T, ConfigError>;
