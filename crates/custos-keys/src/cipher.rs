//! Field-level authenticated encryption.
//!
//! [`FieldCipher`] encrypts individual values (a session note, a reflection,
//! a payment reference) with the active key of a purpose and returns a
//! self-describing [`EncryptedPayload`]. Callers store the payload verbatim;
//! decryption finds the key by id, so payloads survive rotation for as long
//! as the old key is retained.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use custos_core::KeyPurpose;
use custos_crypto::{ALGORITHM, CryptoError, aead};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{KeyError, KeyResult};
use crate::key::KeyId;
use crate::manager::KeyManager;

/// An encrypted value and everything needed to decrypt it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    /// Ciphertext (base64).
    pub data: String,
    /// Key that sealed the value.
    pub key_id: String,
    /// Version of that key at encryption time.
    pub key_version: u32,
    /// Algorithm tag.
    pub algorithm: String,
    /// Nonce (base64, 12 bytes).
    pub iv: String,
    /// Authentication tag (base64, 16 bytes).
    pub auth_tag: String,
    /// Associated data bound into the tag; must match exactly on decrypt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

/// AES-256-GCM encryption with the key manager's keys.
#[derive(Debug, Clone)]
pub struct FieldCipher {
    keys: Arc<KeyManager>,
}

fn decode_field(name: &str, value: &str) -> KeyResult<Vec<u8>> {
    B64.decode(value)
        .map_err(|_| KeyError::MalformedPayload(format!("{name} is not valid base64")))
}

impl FieldCipher {
    /// Encrypt with keys from `keys`.
    #[must_use]
    pub fn new(keys: Arc<KeyManager>) -> Self {
        Self { keys }
    }

    /// The underlying key manager.
    #[must_use]
    pub fn key_manager(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// Encrypt `plaintext` with the active key of `purpose`.
    ///
    /// `aad`, when given, is authenticated but not encrypted and is stored in
    /// the payload's `metadata`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::KeyNotFound`] if the purpose has no active key.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        purpose: KeyPurpose,
        aad: Option<&str>,
    ) -> KeyResult<EncryptedPayload> {
        let key = self.keys.checkout(purpose)?;
        let material = key
            .material()
            .ok_or_else(|| KeyError::KeyNotFound(key.id.to_string()))?;
        let sealed = aead::seal(material, plaintext, aad.unwrap_or_default().as_bytes())?;

        debug!(%purpose, key_id = %key.id, version = key.version, "Encrypted field");
        Ok(EncryptedPayload {
            data: B64.encode(&sealed.ciphertext),
            key_id: key.id.to_string(),
            key_version: key.version,
            algorithm: ALGORITHM.to_string(),
            iv: B64.encode(sealed.iv),
            auth_tag: B64.encode(sealed.tag),
            metadata: aad.map(String::from),
        })
    }

    /// Decrypt a payload with the key it names, active or not.
    ///
    /// # Errors
    ///
    /// - [`KeyError::UnsupportedAlgorithm`] for a foreign algorithm tag
    /// - [`KeyError::MalformedPayload`] for undecodable fields
    /// - [`KeyError::KeyNotFound`] if the key is unknown or purged
    /// - [`KeyError::AuthenticationFailed`] if anything was altered
    pub fn decrypt(&self, payload: &EncryptedPayload) -> KeyResult<Zeroizing<Vec<u8>>> {
        if payload.algorithm != ALGORITHM {
            return Err(KeyError::UnsupportedAlgorithm(payload.algorithm.clone()));
        }
        let key_id = KeyId::parse(&payload.key_id)
            .ok_or_else(|| KeyError::MalformedPayload("keyId is not a UUID".into()))?;
        let ciphertext = decode_field("data", &payload.data)?;
        let iv = decode_field("iv", &payload.iv)?;
        let tag = decode_field("authTag", &payload.auth_tag)?;

        let key = self.keys.get_key(key_id)?;
        let material = key
            .material()
            .ok_or_else(|| KeyError::KeyNotFound(key_id.to_string()))?;

        let aad = payload.metadata.as_deref().unwrap_or_default();
        aead::open(material, &iv, &ciphertext, &tag, aad.as_bytes()).map_err(|e| match e {
            CryptoError::AuthenticationFailed => KeyError::AuthenticationFailed,
            CryptoError::InvalidLength { .. } => KeyError::MalformedPayload(e.to_string()),
            other => KeyError::Crypto(other),
        })
    }

    /// Encrypt a UTF-8 string.
    ///
    /// # Errors
    ///
    /// Same as [`encrypt`](Self::encrypt).
    pub fn encrypt_str(
        &self,
        plaintext: &str,
        purpose: KeyPurpose,
        aad: Option<&str>,
    ) -> KeyResult<EncryptedPayload> {
        self.encrypt(plaintext.as_bytes(), purpose, aad)
    }

    /// Decrypt to a UTF-8 string.
    ///
    /// # Errors
    ///
    /// Same as [`decrypt`](Self::decrypt), plus [`KeyError::MalformedPayload`]
    /// if the plaintext is not UTF-8.
    pub fn decrypt_to_string(&self, payload: &EncryptedPayload) -> KeyResult<String> {
        let plain = self.decrypt(payload)?;
        String::from_utf8(plain.to_vec())
            .map_err(|_| KeyError::MalformedPayload("plaintext is not UTF-8".into()))
    }
}
