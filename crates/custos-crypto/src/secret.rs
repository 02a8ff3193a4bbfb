//! 32-byte secret key material with secure memory handling.

use rand::RngCore;
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{CryptoError, CryptoResult};

/// Length of every symmetric key handled by Custos.
pub const SECRET_LEN: usize = 32;

/// A 32-byte symmetric secret, zeroized on drop.
///
/// Never printed: the `Debug` impl shows only a short fingerprint.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret32([u8; SECRET_LEN]);

impl Secret32 {
    /// Fresh secret from the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wrap existing bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; SECRET_LEN]) -> Self {
        Self(bytes)
    }

    /// Copy from a slice.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] if the slice is not exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let arr = <[u8; SECRET_LEN]>::try_from(bytes).map_err(|_| CryptoError::InvalidKeyLength {
            expected: SECRET_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Decode from hex (64 characters).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidHexEncoding`] or
    /// [`CryptoError::InvalidKeyLength`].
    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let bytes =
            Zeroizing::new(hex::decode(s.trim()).map_err(|_| CryptoError::InvalidHexEncoding)?);
        Self::from_slice(&bytes)
    }

    /// Borrow the raw bytes. Handle with care.
    #[must_use]
    pub fn expose(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }

    /// Short non-secret fingerprint for logs (first 8 bytes of a BLAKE3 hash, hex).
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = blake3::hash(&self.0);
        hex::encode(&digest.as_bytes()[..8])
    }
}

impl PartialEq for Secret32 {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for Secret32 {}

impl std::fmt::Debug for Secret32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret32")
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_random() {
        assert_ne!(Secret32::generate(), Secret32::generate());
    }

    #[test]
    fn test_from_slice_length() {
        assert!(Secret32::from_slice(&[0u8; 32]).is_ok());
        assert!(matches!(
            Secret32::from_slice(&[0u8; 16]),
            Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 16
            })
        ));
    }

    #[test]
    fn test_from_hex() {
        let hex = "11".repeat(32);
        let secret = Secret32::from_hex(&hex).unwrap();
        assert_eq!(secret.expose(), &[0x11u8; 32]);
        assert!(matches!(
            Secret32::from_hex("nothex"),
            Err(CryptoError::InvalidHexEncoding)
        ));
    }

    #[test]
    fn test_debug_does_not_leak() {
        let secret = Secret32::from_bytes([0xAB; 32]);
        let dbg = format!("{secret:?}");
        assert!(!dbg.contains("abababab"));
        assert!(dbg.contains("fingerprint"));
    }
}
