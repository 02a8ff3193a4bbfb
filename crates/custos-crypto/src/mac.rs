//! HMAC-SHA256 signatures over ledger hashes.
//!
//! The ledger signs each entry's integrity hash with a symmetric key held by
//! the process. Anyone holding the same key can verify; nobody without it
//! can forge an entry that verifies.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;

use crate::error::{CryptoError, CryptoResult};
use crate::secret::Secret32;

type HmacSha256 = Hmac<Sha256>;

/// A 32-byte HMAC-SHA256 tag, serialized as hex. Equality is constant-time.
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MacTag([u8; 32]);

impl MacTag {
    /// Wrap raw tag bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw tag bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex tag.
    ///
    /// # Errors
    ///
    /// [`CryptoError::InvalidHexEncoding`] for non-hex input and
    /// [`CryptoError::InvalidLength`] when it does not decode to 32 bytes.
    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let decoded = hex::decode(s).map_err(|_| CryptoError::InvalidHexEncoding)?;
        let actual = decoded.len();
        decoded
            .try_into()
            .map(Self)
            .map_err(|_| CryptoError::InvalidLength {
                field: "signature",
                expected: 32,
                actual,
            })
    }
}

impl PartialEq for MacTag {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for MacTag {}

impl From<MacTag> for String {
    fn from(tag: MacTag) -> Self {
        tag.to_hex()
    }
}

impl TryFrom<String> for MacTag {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl fmt::Debug for MacTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MacTag")
            .field(&hex::encode(self.0.get(..8).unwrap_or_default()))
            .finish()
    }
}

impl fmt::Display for MacTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Symmetric signing key for ledger entries.
#[derive(Clone)]
pub struct SigningKey {
    secret: Secret32,
}

impl SigningKey {
    /// Wrap a secret as a signing key.
    #[must_use]
    pub fn new(secret: Secret32) -> Self {
        Self { secret }
    }

    /// Generate a random signing key.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Secret32::generate())
    }

    /// Short identifier for logs.
    #[must_use]
    pub fn key_id(&self) -> String {
        self.secret.fingerprint()
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length, so this cannot fail for 32 bytes.
        match <HmacSha256 as Mac>::new_from_slice(self.secret.expose()) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC-SHA256 accepts 32-byte keys"),
        }
    }

    /// Sign a message.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> MacTag {
        let mut mac = self.mac();
        mac.update(message);
        let mut out = [0u8; 32];
        out.copy_from_slice(&mac.finalize().into_bytes());
        MacTag(out)
    }

    /// Verify a tag in constant time.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SignatureVerificationFailed`] if the tag does not match.
    pub fn verify(&self, message: &[u8], tag: &MacTag) -> CryptoResult<()> {
        let mut mac = self.mac();
        mac.update(message);
        mac.verify_slice(tag.as_bytes())
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let key = SigningKey::generate();
        let tag = key.sign(b"entry hash");
        assert!(key.verify(b"entry hash", &tag).is_ok());
    }

    #[test]
    fn test_verify_fails_on_altered_message() {
        let key = SigningKey::generate();
        let tag = key.sign(b"entry hash");
        assert!(matches!(
            key.verify(b"entry hasH", &tag),
            Err(CryptoError::SignatureVerificationFailed)
        ));
    }

    #[test]
    fn test_verify_fails_with_other_key() {
        let tag = SigningKey::generate().sign(b"m");
        assert!(SigningKey::generate().verify(b"m", &tag).is_err());
    }

    #[test]
    fn test_deterministic_for_same_key() {
        let key = SigningKey::new(Secret32::from_bytes([7; 32]));
        assert_eq!(key.sign(b"m"), key.sign(b"m"));
    }

    #[test]
    fn test_tag_json_is_hex() {
        let tag = SigningKey::generate().sign(b"m");
        let json = serde_json::to_string(&tag).unwrap();
        let back: MacTag = serde_json::from_str(&json).unwrap();
        assert_eq!(tag, back);
        assert!(MacTag::from_hex("00").is_err());
    }
}
