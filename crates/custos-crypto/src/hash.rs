//! BLAKE3 digests for chaining ledger entries.
//!
//! Every entry stores the digest of its own canonical fields and the digest
//! of the entry before it. The first entry points at [`ContentHash::zero`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Digest length in bytes.
pub const HASH_LEN: usize = blake3::OUT_LEN;

/// A 32-byte BLAKE3 digest. Serialized as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ContentHash([u8; HASH_LEN]);

impl ContentHash {
    /// Plain BLAKE3 over `data`.
    #[must_use]
    pub fn hash(data: &[u8]) -> Self {
        blake3::hash(data).into()
    }

    /// Digest of `data` in BLAKE3's derive-key mode under `domain`.
    #[must_use]
    pub fn hash_with_domain(domain: &str, data: &[u8]) -> Self {
        Self::hash_parts_with_domain(domain, &[data])
    }

    /// Same as [`Self::hash_with_domain`] over the concatenation of `parts`.
    #[must_use]
    pub fn hash_parts_with_domain(domain: &str, parts: &[&[u8]]) -> Self {
        parts
            .iter()
            .fold(blake3::Hasher::new_derive_key(domain), |mut h, part| {
                h.update(part);
                h
            })
            .finalize()
            .into()
    }

    /// The all-zero digest used as the genesis predecessor.
    #[must_use]
    pub const fn zero() -> Self {
        Self([0; HASH_LEN])
    }

    /// Whether every byte is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Borrow the digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Lowercase hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex string.
    ///
    /// # Errors
    ///
    /// Fails on non-hex input or a decoded length other than [`HASH_LEN`].
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut out = [0u8; HASH_LEN];
        hex::decode_to_slice(s, &mut out)?;
        Ok(Self(out))
    }
}

impl From<blake3::Hash> for ContentHash {
    fn from(value: blake3::Hash) -> Self {
        Self(*value.as_bytes())
    }
}

impl From<ContentHash> for String {
    fn from(value: ContentHash) -> Self {
        value.to_hex()
    }
}

impl TryFrom<String> for ContentHash {
    type Error = hex::FromHexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl FromStr for ContentHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    // Short prefix only; full digests make ledger dumps unreadable.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = hex::encode(self.0.get(..8).unwrap_or_default());
        f.debug_tuple("ContentHash").field(&short).finish()
    }
}

impl AsRef<[u8]> for ContentHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
