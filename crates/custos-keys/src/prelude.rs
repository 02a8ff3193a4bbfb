//! Prelude module - commonly used types for convenient import.
//!
//! Use `use custos_keys::prelude::*;` to import all essential types.

// Errors
pub use crate::{KeyError, KeyResult};

// Key lifecycle
pub use crate::{EncryptionKey, KeyId, KeyManager, PolicySet, RotationPolicy};

// Field encryption
pub use crate::{EncryptedPayload, FieldCipher};

// Storage
pub use crate::{KeyStore, KvKeyStore};
