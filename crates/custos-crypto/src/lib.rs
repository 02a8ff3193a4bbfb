//! Custos Crypto - Cryptographic primitives for the audit ledger and key manager.
//!
//! This crate provides:
//! - BLAKE3 content hashing with domain separation for the audit hash chain
//! - HMAC-SHA256 signing keys and tags for ledger entries
//! - AES-256-GCM sealing with detached IV and tag
//! - PBKDF2 password wrapping of 32-byte secrets (key export, key files)
//! - Secret bootstrap from environment, encrypted key file or generation
//!
//! # Example
//!
//! ```
//! use custos_crypto::{ContentHash, SigningKey};
//!
//! let key = SigningKey::generate();
//! let hash = ContentHash::hash_with_domain("custos example", b"entry");
//! let tag = key.sign(hash.as_bytes());
//! assert!(key.verify(hash.as_bytes(), &tag).is_ok());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod aead;
mod bootstrap;
mod error;
mod hash;
mod mac;
mod secret;
pub mod wrap;

pub use aead::{ALGORITHM, IV_LEN, Sealed, TAG_LEN};
pub use bootstrap::{SecretBootstrap, SecretSource};
pub use error::{CryptoError, CryptoResult};
pub use hash::ContentHash;
pub use mac::{MacTag, SigningKey};
pub use secret::{SECRET_LEN, Secret32};
pub use wrap::{MIN_PASSWORD_LEN, PBKDF2_ITERATIONS, WrappedSecret};
