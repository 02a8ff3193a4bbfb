//! Password-based wrapping of 32-byte secrets.
//!
//! A wrapping key is derived with PBKDF2-HMAC-SHA256 from a password and a
//! random salt, then the secret is sealed with AES-256-GCM. The resulting
//! [`WrappedSecret`] is a self-describing document safe to write to disk or
//! hand to an operator.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::aead::{self, ALGORITHM};
use crate::error::{CryptoError, CryptoResult};
use crate::secret::{SECRET_LEN, Secret32};

/// Default PBKDF2 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 210_000;

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Minimum password length in characters.
pub const MIN_PASSWORD_LEN: usize = 12;

/// Current document format version.
const FORMAT_VERSION: u32 = 1;

/// A secret sealed under a password-derived key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedSecret {
    /// Document format version.
    pub version: u32,
    /// Key derivation function name.
    pub kdf: String,
    /// PBKDF2 iteration count.
    pub iterations: u32,
    /// Salt (base64).
    pub salt: String,
    /// Cipher algorithm tag.
    pub algorithm: String,
    /// Nonce (base64).
    pub iv: String,
    /// Ciphertext (base64).
    pub ciphertext: String,
    /// Authentication tag (base64).
    pub tag: String,
}

/// Reject passwords below [`MIN_PASSWORD_LEN`] characters.
///
/// # Errors
///
/// Returns [`CryptoError::WeakPassword`].
pub fn check_password(password: &str) -> CryptoResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CryptoError::WeakPassword {
            min_len: MIN_PASSWORD_LEN,
        });
    }
    Ok(())
}

/// Derive a 32-byte wrapping key.
#[must_use]
pub fn derive_key(password: &str, salt: &[u8], iterations: u32) -> Secret32 {
    let mut out = [0u8; SECRET_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    let secret = Secret32::from_bytes(out);
    zeroize::Zeroize::zeroize(&mut out);
    secret
}

fn decode(field: &str) -> CryptoResult<Vec<u8>> {
    B64.decode(field).map_err(|_| CryptoError::InvalidBase64Encoding)
}

impl WrappedSecret {
    /// Wrap `secret` under `password`, binding `aad`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::WeakPassword`] for a short password, or an
    /// encryption error.
    pub fn wrap(secret: &Secret32, password: &str, aad: &[u8]) -> CryptoResult<Self> {
        Self::wrap_with_iterations(secret, password, aad, PBKDF2_ITERATIONS)
    }

    /// [`wrap`](Self::wrap) with an explicit iteration count.
    ///
    /// # Errors
    ///
    /// Same as [`wrap`](Self::wrap).
    pub fn wrap_with_iterations(
        secret: &Secret32,
        password: &str,
        aad: &[u8],
        iterations: u32,
    ) -> CryptoResult<Self> {
        check_password(password)?;
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let wrapping_key = derive_key(password, &salt, iterations.max(1));
        let sealed = aead::seal(&wrapping_key, secret.expose(), aad)?;

        Ok(Self {
            version: FORMAT_VERSION,
            kdf: "pbkdf2-hmac-sha256".to_string(),
            iterations: iterations.max(1),
            salt: B64.encode(salt),
            algorithm: ALGORITHM.to_string(),
            iv: B64.encode(sealed.iv),
            ciphertext: B64.encode(&sealed.ciphertext),
            tag: B64.encode(sealed.tag),
        })
    }

    /// Recover the secret.
    ///
    /// A wrong password and tampered `aad` are indistinguishable and both
    /// surface as [`CryptoError::AuthenticationFailed`].
    ///
    /// # Errors
    ///
    /// Returns an encoding error for a malformed document or
    /// [`CryptoError::AuthenticationFailed`].
    pub fn unwrap_secret(&self, password: &str, aad: &[u8]) -> CryptoResult<Secret32> {
        if self.version != FORMAT_VERSION || self.algorithm != ALGORITHM {
            return Err(CryptoError::Serialization(format!(
                "unsupported wrapped secret (version {}, algorithm {})",
                self.version, self.algorithm
            )));
        }
        let salt = decode(&self.salt)?;
        let iv = decode(&self.iv)?;
        let ciphertext = decode(&self.ciphertext)?;
        let tag = decode(&self.tag)?;

        let wrapping_key = derive_key(password, &salt, self.iterations);
        let plain = aead::open(&wrapping_key, &iv, &ciphertext, &tag, aad)?;
        Secret32::from_slice(&plain)
    }

    /// Serialize to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Serialization`] on failure.
    pub fn to_json(&self) -> CryptoResult<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| CryptoError::Serialization(e.to_string()))
    }

    /// Parse from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Serialization`] on failure.
    pub fn from_json(bytes: &[u8]) -> CryptoResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| CryptoError::Serialization(e.to_string()))
    }
}
