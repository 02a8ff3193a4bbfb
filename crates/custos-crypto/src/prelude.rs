//! Prelude module - commonly used types for convenient import.
//!
//! Use `use custos_crypto::prelude::*;` to import all essential types.

// Errors
pub use crate::{CryptoError, CryptoResult};

// Keys
pub use crate::{Secret32, SecretBootstrap, SecretSource, SigningKey};

// Signatures
pub use crate::MacTag;

// Hashing
pub use crate::ContentHash;

// Wrapping
pub use crate::WrappedSecret;
