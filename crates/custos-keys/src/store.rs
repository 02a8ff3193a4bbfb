//! Durable storage of key records.
//!
//! Material is sealed under the key-encryption key (KEK) before it reaches
//! the backend; the AAD binds each ciphertext to its key id, purpose and
//! version so records cannot be swapped.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use custos_crypto::{Secret32, aead};
use custos_storage::{BlockingKvStore, KvStore, MemoryKvStore};
use serde::{Deserialize, Serialize};

use crate::error::{KeyError, KeyResult};
use crate::key::EncryptionKey;
use crate::policy::RotationPolicy;

/// Namespace for key records.
const NS_KEYS: &str = "keys:records";

/// Namespace for administratively updated rotation policies, keyed by purpose.
const NS_POLICIES: &str = "keys:policies";

/// Key material sealed under the KEK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedMaterial {
    /// Nonce (base64).
    pub iv: String,
    /// Ciphertext (base64).
    pub ciphertext: String,
    /// Tag (base64).
    pub tag: String,
}

/// A key as persisted: metadata plus sealed material (absent once purged).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Key metadata.
    #[serde(flatten)]
    pub key: EncryptionKey,
    /// Sealed material.
    pub sealed_material: Option<SealedMaterial>,
}

fn material_aad(key: &EncryptionKey) -> Vec<u8> {
    format!(
        "custos key material v1|{}|{}|{}",
        key.id, key.purpose, key.version
    )
    .into_bytes()
}

impl KeyRecord {
    /// Seal `key` for storage.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Crypto`] if sealing fails.
    pub fn seal(key: &EncryptionKey, kek: &Secret32) -> KeyResult<Self> {
        let sealed_material = match key.material() {
            Some(material) => {
                let sealed = aead::seal(kek, material.expose(), &material_aad(key))?;
                Some(SealedMaterial {
                    iv: B64.encode(sealed.iv),
                    ciphertext: B64.encode(&sealed.ciphertext),
                    tag: B64.encode(sealed.tag),
                })
            },
            None => None,
        };
        Ok(Self {
            key: key.clone(),
            sealed_material,
        })
    }

    /// Recover the key with its material.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Crypto`] if the KEK does not open the material
    /// (wrong KEK or tampered record).
    pub fn unseal(self, kek: &Secret32) -> KeyResult<EncryptionKey> {
        let mut key = self.key;
        let material = match self.sealed_material {
            Some(sealed) => {
                let decode = |s: &str| {
                    B64.decode(s)
                        .map_err(|_| KeyError::MalformedPayload(format!("sealed material of {}", key.id)))
                };
                let plain = aead::open(
                    kek,
                    &decode(&sealed.iv)?,
                    &decode(&sealed.ciphertext)?,
                    &decode(&sealed.tag)?,
                    &material_aad(&key),
                )?;
                Some(Secret32::from_slice(&plain)?)
            },
            None => None,
        };
        key.set_material(material);
        Ok(key)
    }
}

/// Durable backend for key records.
///
/// Synchronous: the key manager is called from request paths.
pub trait KeyStore: Send + Sync {
    /// Load every record.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::PersistenceFailure`] if the backend cannot be read.
    fn load_all(&self) -> KeyResult<Vec<KeyRecord>>;

    /// Write several records in one commit.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::PersistenceFailure`]; nothing is written then.
    fn save_batch(&self, records: &[KeyRecord]) -> KeyResult<()>;

    /// Write one record.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::PersistenceFailure`].
    fn save(&self, record: &KeyRecord) -> KeyResult<()> {
        self.save_batch(std::slice::from_ref(record))
    }

    /// Policies saved by [`save_policy`](Self::save_policy), any order.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::PersistenceFailure`] if the backend cannot be read.
    fn load_policies(&self) -> KeyResult<Vec<RotationPolicy>>;

    /// Persist `policy`, replacing the one stored for its purpose.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::PersistenceFailure`].
    fn save_policy(&self, policy: &RotationPolicy) -> KeyResult<()>;

    /// Flush buffered writes.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::PersistenceFailure`].
    fn flush(&self) -> KeyResult<()> {
        Ok(())
    }
}

/// [`KeyStore`] over a [`KvStore`] namespace.
#[derive(Debug, Clone)]
pub struct KvKeyStore {
    kv: BlockingKvStore,
    policies: BlockingKvStore,
}

impl KvKeyStore {
    /// Use `store` for key records.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::PersistenceFailure`] if the namespace is rejected.
    pub fn new(store: Arc<dyn KvStore>) -> KeyResult<Self> {
        let kv = BlockingKvStore::new(store, NS_KEYS)?;
        let policies = kv.with_namespace(NS_POLICIES)?;
        Ok(Self { kv, policies })
    }

    /// Ephemeral store for tests and development.
    #[must_use]
    pub fn in_memory() -> Self {
        match Self::new(Arc::new(MemoryKvStore::new())) {
            Ok(store) => store,
            Err(_) => unreachable!("namespace constants are valid"),
        }
    }
}

impl KeyStore for KvKeyStore {
    fn load_all(&self) -> KeyResult<Vec<KeyRecord>> {
        let mut records = Vec::new();
        for id in self.kv.list_keys()? {
            if let Some(record) = self.kv.get_json::<KeyRecord>(&id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn save_batch(&self, records: &[KeyRecord]) -> KeyResult<()> {
        let pairs = records
            .iter()
            .map(|r| {
                serde_json::to_vec(r)
                    .map(|bytes| (r.key.id.to_string(), bytes))
                    .map_err(|e| KeyError::PersistenceFailure(e.to_string()))
            })
            .collect::<KeyResult<Vec<_>>>()?;
        self.kv.set_batch(pairs)?;
        Ok(())
    }

    fn load_policies(&self) -> KeyResult<Vec<RotationPolicy>> {
        let mut policies = Vec::new();
        for purpose in self.policies.list_keys()? {
            if let Some(policy) = self.policies.get_json::<RotationPolicy>(&purpose)? {
                policies.push(policy);
            }
        }
        Ok(policies)
    }

    fn save_policy(&self, policy: &RotationPolicy) -> KeyResult<()> {
        self.policies.set_json(policy.purpose.as_str(), policy)?;
        Ok(())
    }

    fn flush(&self) -> KeyResult<()> {
        self.kv.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custos_core::KeyPurpose;

    #[test]
    fn test_seal_unseal() {
        let kek = Secret32::generate();
        let key = EncryptionKey::generate(KeyPurpose::Data, 1, 90);
        let record = KeyRecord::seal(&key, &kek).unwrap();
        assert!(record.sealed_material.is_some());

        let back = record.unseal(&kek).unwrap();
        assert_eq!(back.material(), key.material());
    }

    #[test]
    fn test_unseal_with_wrong_kek_fails() {
        let key = EncryptionKey::generate(KeyPurpose::Data, 1, 90);
        let record = KeyRecord::seal(&key, &Secret32::generate()).unwrap();
        assert!(record.unseal(&Secret32::generate()).is_err());
    }

    #[test]
    fn test_swapped_version_fails() {
        let kek = Secret32::generate();
        let key = EncryptionKey::generate(KeyPurpose::Data, 1, 90);
        let mut record = KeyRecord::seal(&key, &kek).unwrap();
        record.key.version = 2;
        assert!(record.unseal(&kek).is_err());
    }

    #[test]
    fn test_record_json_never_contains_raw_material() {
        let kek = Secret32::generate();
        let key = EncryptionKey::generate(KeyPurpose::Backup, 1, 180);
        let raw_b64 = B64.encode(key.material().unwrap().expose());
        let json = serde_json::to_string(&KeyRecord::seal(&key, &kek).unwrap()).unwrap();
        assert!(!json.contains(&raw_b64));
        assert!(json.contains("\"key_id\""));
    }

    #[test]
    fn test_kv_store_roundtrip() {
        let store = KvKeyStore::in_memory();
        let kek = Secret32::generate();
        let a = KeyRecord::seal(&EncryptionKey::generate(KeyPurpose::Data, 1, 90), &kek).unwrap();
        let b = KeyRecord::seal(&EncryptionKey::generate(KeyPurpose::Transit, 1, 30), &kek).unwrap();
        store.save_batch(&[a, b]).unwrap();
        assert_eq!(store.load_all().unwrap().len(), 2);
    }

    #[test]
    fn test_policies_live_beside_records() {
        let store = KvKeyStore::in_memory();
        assert!(store.load_policies().unwrap().is_empty());

        let mut transit = RotationPolicy::default_for(KeyPurpose::Transit);
        transit.rotation_interval_days = 7;
        store.save_policy(&transit).unwrap();
        transit.rotation_interval_days = 3;
        store.save_policy(&transit).unwrap();

        assert_eq!(store.load_policies().unwrap(), vec![transit]);
        assert!(store.load_all().unwrap().is_empty());
    }
}
