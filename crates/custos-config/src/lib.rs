#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Layered TOML configuration for Custos.
//!
//! ```rust,no_run
//! use custos_config::Config;
//!
//! let resolved = Config::load().unwrap();
//! println!("rotation sweep every {}s", resolved.config.scheduler.rotation_interval_secs);
//! ```
//!
//! Precedence, strongest first: an explicit file given to
//! [`Config::load_with`], `~/.custos/config.toml`, `/etc/custos/config.toml`,
//! then the embedded `defaults.toml`. `CUSTOS_*` environment variables only
//! fill fields that no file sets.
//!
//! Nothing here depends on other custos crates; `custos-runtime` maps these
//! types onto the domain.

/// Environment variable fallback resolution.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Layered configuration merging with precedence.
pub mod merge;
/// Resolved configuration display and serialization.
pub mod show;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

// Re-export primary types at the crate root.
pub use error::{ConfigError, ConfigResult};
pub use loader::LoadOptions;
pub use merge::ConfigLayer;
pub use show::{ResolvedConfig, ShowFormat};
pub use types::*;

impl Config {
    /// Discover and merge every layer from the running process.
    ///
    /// # Errors
    ///
    /// See [`loader::load`].
    pub fn load() -> ConfigResult<ResolvedConfig> {
        loader::load(&LoadOptions::default())
    }

    /// Like [`Config::load`] with an explicit file, home or environment.
    ///
    /// # Errors
    ///
    /// See [`loader::load`].
    pub fn load_with(options: &LoadOptions) -> ConfigResult<ResolvedConfig> {
        loader::load(options)
    }

    /// One file over the embedded defaults.
    ///
    /// # Errors
    ///
    /// See [`loader::load_file`].
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }
}
