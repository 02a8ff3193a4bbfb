//! AES-256-GCM sealing with detached IV and tag.
//!
//! Callers that persist ciphertexts (field encryption envelopes, wrapped key
//! exports, key material at rest) store the IV and tag as separate fields,
//! so [`seal`] splits them out of the `aes-gcm` output.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::secret::Secret32;

/// AES-GCM nonce length.
pub const IV_LEN: usize = 12;

/// AES-GCM tag length.
pub const TAG_LEN: usize = 16;

/// Algorithm tag recorded alongside every ciphertext.
pub const ALGORITHM: &str = "aes-256-gcm";

/// Output of [`seal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// Random 96-bit nonce.
    pub iv: [u8; IV_LEN],
    /// Ciphertext without the tag.
    pub ciphertext: Vec<u8>,
    /// 128-bit authentication tag.
    pub tag: [u8; TAG_LEN],
}

/// A fresh random IV.
#[must_use]
pub fn generate_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

fn cipher(key: &Secret32) -> CryptoResult<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key.expose()).map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

/// Encrypt `plaintext` under `key`, binding `aad`.
///
/// # Errors
///
/// Returns [`CryptoError::EncryptionFailed`] if the cipher rejects the input.
pub fn seal(key: &Secret32, plaintext: &[u8], aad: &[u8]) -> CryptoResult<Sealed> {
    let iv = generate_iv();
    let mut out = cipher(key)?
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let split = out.len().checked_sub(TAG_LEN).ok_or_else(|| {
        CryptoError::EncryptionFailed("cipher output shorter than tag".into())
    })?;
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&out[split..]);
    out.truncate(split);

    Ok(Sealed {
        iv,
        ciphertext: out,
        tag,
    })
}

/// Decrypt and authenticate.
///
/// # Errors
///
/// - [`CryptoError::InvalidLength`] if `iv` or `tag` has the wrong size
/// - [`CryptoError::AuthenticationFailed`] if ciphertext, tag or `aad` was altered
pub fn open(
    key: &Secret32,
    iv: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
    aad: &[u8],
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    if iv.len() != IV_LEN {
        return Err(CryptoError::InvalidLength {
            field: "iv",
            expected: IV_LEN,
            actual: iv.len(),
        });
    }
    if tag.len() != TAG_LEN {
        return Err(CryptoError::InvalidLength {
            field: "tag",
            expected: TAG_LEN,
            actual: tag.len(),
        });
    }

    let mut combined = Vec::with_capacity(ciphertext.len().saturating_add(TAG_LEN));
    combined.extend_from_slice(ciphertext);
    combined.extend_from_slice(tag);

    cipher(key)?
        .decrypt(
            Nonce::from_slice(iv),
            Payload {
                msg: &combined,
                aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::AuthenticationFailed)
}
