//! Loading long-lived secrets at process start.
//!
//! Resolution order:
//!
//! 1. An environment variable holding 64 hex characters.
//! 2. An encrypted key file, unlocked with a passphrase.
//! 3. A freshly generated secret, written to the key file with an atomic
//!    `O_CREAT | O_EXCL` create and mode 0o600.
//!
//! Without a passphrase there is no way to protect a key file, so a random
//! ephemeral secret is used for the life of the process and a warning is
//! logged: anything sealed or signed with it is unverifiable after restart.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::secret::Secret32;
use crate::wrap::{PBKDF2_ITERATIONS, WrappedSecret};

/// Associated data bound into every key file.
const KEY_FILE_AAD: &[u8] = b"custos secret file v1";

/// Maximum accepted key file size.
const MAX_KEY_FILE_BYTES: u64 = 64 * 1024;

/// Where a bootstrapped secret came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    /// Read from an environment variable.
    Environment,
    /// Unlocked from an existing key file.
    KeyFile,
    /// Generated and persisted to a new key file.
    Generated,
    /// Generated for this process only.
    Ephemeral,
}

/// Resolves one named secret (e.g. the ledger signing key).
#[derive(Clone)]
pub struct SecretBootstrap {
    name: String,
    env_var: Option<String>,
    key_file: Option<PathBuf>,
    passphrase: Option<Zeroizing<String>>,
    iterations: u32,
}

impl std::fmt::Debug for SecretBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBootstrap")
            .field("name", &self.name)
            .field("env_var", &self.env_var)
            .field("key_file", &self.key_file)
            .field("has_passphrase", &self.passphrase.is_some())
            .finish_non_exhaustive()
    }
}

impl SecretBootstrap {
    /// Start describing how to resolve the secret called `name` (used in logs).
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            env_var: None,
            key_file: None,
            passphrase: None,
            iterations: PBKDF2_ITERATIONS,
        }
    }

    /// Environment variable checked first.
    #[must_use]
    pub fn env_var(mut self, var: impl Into<String>) -> Self {
        self.env_var = Some(var.into());
        self
    }

    /// Encrypted key file location.
    #[must_use]
    pub fn key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_file = Some(path.into());
        self
    }

    /// Passphrase protecting the key file.
    #[must_use]
    pub fn passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(Zeroizing::new(passphrase.into()));
        self
    }

    /// PBKDF2 iteration count for newly written key files.
    #[must_use]
    pub fn iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    /// Resolve using the process environment.
    ///
    /// # Errors
    ///
    /// See [`resolve_with`](Self::resolve_with).
    pub fn resolve(&self) -> CryptoResult<(Secret32, SecretSource)> {
        self.resolve_with(|var| std::env::var(var).ok())
    }

    /// Resolve using `lookup` in place of the process environment.
    ///
    /// # Errors
    ///
    /// - [`CryptoError::Bootstrap`] if the environment value is malformed
    /// - [`CryptoError::AuthenticationFailed`] if the passphrase does not
    ///   unlock the key file
    /// - [`CryptoError::Io`] on file errors, including a symlinked key file
    pub fn resolve_with<F>(&self, lookup: F) -> CryptoResult<(Secret32, SecretSource)>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(var) = &self.env_var
            && let Some(value) = lookup(var).map(Zeroizing::new)
            && !value.trim().is_empty()
        {
            let secret = Secret32::from_hex(&value).map_err(|e| {
                CryptoError::Bootstrap(format!("{var} must hold 64 hex characters: {e}"))
            })?;
            info!(secret = %self.name, source = "environment", "Secret loaded");
            return Ok((secret, SecretSource::Environment));
        }

        match (&self.key_file, &self.passphrase) {
            (Some(path), Some(passphrase)) => self.load_or_create(path, passphrase),
            (path, None) => {
                warn!(
                    secret = %self.name,
                    key_file = ?path,
                    "No passphrase configured: using an EPHEMERAL secret. Data sealed or \
                     signed with it cannot be verified after this process exits"
                );
                Ok((Secret32::generate(), SecretSource::Ephemeral))
            },
            (None, Some(_)) => Err(CryptoError::Bootstrap(format!(
                "{}: passphrase given but no key file configured",
                self.name
            ))),
        }
    }

    fn load_or_create(
        &self,
        path: &Path,
        passphrase: &str,
    ) -> CryptoResult<(Secret32, SecretSource)> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CryptoError::Io(e.to_string()))?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(0o600)
                .open(path)
            {
                Ok(mut file) => {
                    let secret = Secret32::generate();
                    let wrapped = WrappedSecret::wrap_with_iterations(
                        &secret,
                        passphrase,
                        KEY_FILE_AAD,
                        self.iterations,
                    )?;
                    file.write_all(&wrapped.to_json()?)
                        .map_err(|e| CryptoError::Io(e.to_string()))?;
                    file.sync_all()
                        .map_err(|e| CryptoError::Io(e.to_string()))?;
                    info!(secret = %self.name, path = %path.display(), "Generated new secret key file");
                    return Ok((secret, SecretSource::Generated));
                },
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {},
                Err(e) => return Err(CryptoError::Io(e.to_string())),
            }
        }

        #[cfg(not(unix))]
        if !path.exists() {
            let secret = Secret32::generate();
            let wrapped =
                WrappedSecret::wrap_with_iterations(&secret, passphrase, KEY_FILE_AAD, self.iterations)?;
            std::fs::write(path, wrapped.to_json()?)
                .map_err(|e| CryptoError::Io(e.to_string()))?;
            return Ok((secret, SecretSource::Generated));
        }

        let meta =
            std::fs::symlink_metadata(path).map_err(|e| CryptoError::Io(e.to_string()))?;
        if meta.file_type().is_symlink() {
            return Err(CryptoError::Io(
                "refusing to read key file: path is a symlink".into(),
            ));
        }
        if meta.len() > MAX_KEY_FILE_BYTES {
            return Err(CryptoError::Io(format!(
                "key file too large ({} bytes)",
                meta.len()
            )));
        }

        let bytes =
            Zeroizing::new(std::fs::read(path).map_err(|e| CryptoError::Io(e.to_string()))?);
        let wrapped = WrappedSecret::from_json(&bytes)?;
        let secret = wrapped.unwrap_secret(passphrase, KEY_FILE_AAD)?;
        info!(secret = %self.name, path = %path.display(), "Secret unlocked from key file");
        Ok((secret, SecretSource::KeyFile))
    }
}
