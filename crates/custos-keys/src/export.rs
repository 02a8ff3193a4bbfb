//! Password-protected key export documents.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use custos_core::{KeyPurpose, Timestamp};
use custos_crypto::{CryptoError, Secret32, WrappedSecret};
use serde::{Deserialize, Serialize};

use crate::error::{KeyError, KeyResult};
use crate::key::{EncryptionKey, KeyId};

const EXPORT_FORMAT: &str = "custos-key-export";
const EXPORT_VERSION: u32 = 1;

/// The JSON document inside an export blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct KeyExport {
    pub(crate) format: String,
    pub(crate) format_version: u32,
    pub(crate) key_id: KeyId,
    pub(crate) purpose: KeyPurpose,
    pub(crate) version: u32,
    pub(crate) algorithm: String,
    pub(crate) created_at: Timestamp,
    pub(crate) expires_at: Timestamp,
    pub(crate) exported_at: Timestamp,
    pub(crate) wrapped: WrappedSecret,
}

fn export_aad(key_id: KeyId, purpose: KeyPurpose, version: u32) -> Vec<u8> {
    format!("custos key export v1|{key_id}|{purpose}|{version}").into_bytes()
}

fn map_password_err(e: CryptoError) -> KeyError {
    match e {
        CryptoError::WeakPassword { min_len } => KeyError::WeakPassword { min_len },
        CryptoError::AuthenticationFailed => KeyError::AuthenticationFailed,
        other => KeyError::Crypto(other),
    }
}

/// Reject passwords too short to protect an export.
pub(crate) fn check_password(password: &str) -> KeyResult<()> {
    custos_crypto::wrap::check_password(password).map_err(map_password_err)
}

impl KeyExport {
    /// Wrap `key` (which must still hold material) under `password`.
    pub(crate) fn create(
        key: &EncryptionKey,
        material: &Secret32,
        password: &str,
        iterations: u32,
    ) -> KeyResult<Self> {
        let wrapped = WrappedSecret::wrap_with_iterations(
            material,
            password,
            &export_aad(key.id, key.purpose, key.version),
            iterations,
        )
        .map_err(map_password_err)?;

        Ok(Self {
            format: EXPORT_FORMAT.to_string(),
            format_version: EXPORT_VERSION,
            key_id: key.id,
            purpose: key.purpose,
            version: key.version,
            algorithm: key.algorithm.clone(),
            created_at: key.created_at,
            expires_at: key.expires_at,
            exported_at: Timestamp::now(),
            wrapped,
        })
    }

    /// Encode as base64 of the JSON document.
    pub(crate) fn to_blob(&self) -> KeyResult<String> {
        let json =
            serde_json::to_vec(self).map_err(|e| KeyError::InvalidExport(e.to_string()))?;
        Ok(B64.encode(json))
    }

    /// Decode a blob produced by [`to_blob`](Self::to_blob).
    pub(crate) fn from_blob(blob: &str) -> KeyResult<Self> {
        let json = B64
            .decode(blob.trim())
            .map_err(|_| KeyError::InvalidExport("blob is not base64".into()))?;
        let export: Self =
            serde_json::from_slice(&json).map_err(|e| KeyError::InvalidExport(e.to_string()))?;
        if export.format != EXPORT_FORMAT || export.format_version != EXPORT_VERSION {
            return Err(KeyError::InvalidExport(format!(
                "unsupported export {} v{}",
                export.format, export.format_version
            )));
        }
        if export.algorithm != custos_crypto::ALGORITHM {
            return Err(KeyError::UnsupportedAlgorithm(export.algorithm));
        }
        Ok(export)
    }

    /// Recover the material.
    pub(crate) fn unwrap_material(&self, password: &str) -> KeyResult<Secret32> {
        self.wrapped
            .unwrap_secret(
                password,
                &export_aad(self.key_id, self.purpose, self.version),
            )
            .map_err(map_password_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSWORD: &str = "export password 123";

    #[test]
    fn test_blob_roundtrip() {
        let key = EncryptionKey::generate(KeyPurpose::Data, 4, 90);
        let export = KeyExport::create(&key, key.material().unwrap(), PASSWORD, 1_000).unwrap();
        let parsed = KeyExport::from_blob(&export.to_blob().unwrap()).unwrap();
        assert_eq!(parsed.key_id, key.id);
        assert_eq!(parsed.version, 4);
        assert_eq!(&parsed.unwrap_material(PASSWORD).unwrap(), key.material().unwrap());
    }

    #[test]
    fn test_wrong_password_is_authentication_failure() {
        let key = EncryptionKey::generate(KeyPurpose::Data, 1, 90);
        let export = KeyExport::create(&key, key.material().unwrap(), PASSWORD, 1_000).unwrap();
        assert!(matches!(
            export.unwrap_material("another password 456"),
            Err(KeyError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_tampered_metadata_fails() {
        let key = EncryptionKey::generate(KeyPurpose::Data, 1, 90);
        let mut export =
            KeyExport::create(&key, key.material().unwrap(), PASSWORD, 1_000).unwrap();
        export.purpose = KeyPurpose::Transit;
        assert!(export.unwrap_material(PASSWORD).is_err());
    }

    #[test]
    fn test_garbage_blob() {
        assert!(matches!(
            KeyExport::from_blob("!!!"),
            Err(KeyError::InvalidExport(_))
        ));
        let not_json = B64.encode(b"{\"x\":1}");
        assert!(matches!(
            KeyExport::from_blob(&not_json),
            Err(KeyError::InvalidExport(_))
        ));
    }

    #[test]
    fn test_weak_password() {
        assert!(matches!(
            check_password("short"),
            Err(KeyError::WeakPassword { min_len: 12 })
        ));
    }
}
