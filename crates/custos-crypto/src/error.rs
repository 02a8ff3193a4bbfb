//! Errors from the cryptographic primitives.

/// Failure of a hashing, signing, sealing or key-handling operation.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Key material of the wrong size.
    #[error("key must be {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Required size.
        expected: usize,
        /// Size supplied.
        actual: usize,
    },

    /// A nonce, tag or signature of the wrong size.
    #[error("{field} must be {expected} bytes, got {actual}")]
    InvalidLength {
        /// Component name, e.g. `iv` or `tag`.
        field: &'static str,
        /// Required size.
        expected: usize,
        /// Size supplied.
        actual: usize,
    },

    /// Input was not hex.
    #[error("malformed hex")]
    InvalidHexEncoding,

    /// Input was not base64.
    #[error("malformed base64")]
    InvalidBase64Encoding,

    /// The AEAD rejected ciphertext, tag or associated data.
    #[error("authentication failed: ciphertext, tag or associated data was altered")]
    AuthenticationFailed,

    /// An HMAC tag did not match.
    #[error("signature does not verify")]
    SignatureVerificationFailed,

    /// Password shorter than the minimum.
    #[error("password needs at least {min_len} characters")]
    WeakPassword {
        /// Minimum length in characters.
        min_len: usize,
    },

    /// Sealing failed for a reason other than authentication.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// A wrapped-secret document could not be encoded or decoded.
    #[error("wrapped secret encoding: {0}")]
    Serialization(String),

    /// No usable secret could be resolved at startup.
    #[error("secret bootstrap failed: {0}")]
    Bootstrap(String),

    /// Reading or writing a key file failed.
    #[error("key file I/O: {0}")]
    Io(String),
}

/// Result alias for this crate.
pub type CryptoResult<T> = Result<T, CryptoError>;
