//! Custos Keys - Symmetric key lifecycle and field-level encryption.
//!
//! This crate provides:
//! - [`KeyManager`]: one active key per purpose, policy-driven rotation,
//!   activation, retention cleanup, password-protected export/import
//! - [`FieldCipher`]: AES-256-GCM encryption of individual values with the
//!   manager's keys, returning a self-describing [`EncryptedPayload`]
//! - [`KeyStore`]: the durable backend seam, with a [`KvKeyStore`] over any
//!   `custos_storage::KvStore`
//!
//! Key material is sealed under a key-encryption key before it is
//! persisted and never appears in a serialized record in the clear.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use custos_core::KeyPurpose;
//! use custos_crypto::Secret32;
//! use custos_keys::{FieldCipher, KeyManager, KvKeyStore, PolicySet};
//!
//! let keys = KeyManager::open(
//!     Arc::new(KvKeyStore::in_memory()),
//!     PolicySet::default(),
//!     Secret32::generate(),
//! )
//! .unwrap();
//! let cipher = FieldCipher::new(Arc::new(keys));
//!
//! let payload = cipher.encrypt_str("session notes", KeyPurpose::Data, Some("client:7")).unwrap();
//! assert_eq!(cipher.decrypt_to_string(&payload).unwrap(), "session notes");
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod cipher;
mod error;
mod export;
mod key;
mod manager;
mod policy;
mod store;

pub use cipher::{EncryptedPayload, FieldCipher};
pub use error::{KeyError, KeyResult};
pub use key::{EncryptionKey, KeyEvent, KeyEventKind, KeyId, KeyStatus};
pub use manager::{KeyManager, KeyMetrics, PurposeMetrics};
pub use policy::{PolicySet, RotationPolicy};
pub use store::{KeyRecord, KeyStore, KvKeyStore, SealedMaterial};
