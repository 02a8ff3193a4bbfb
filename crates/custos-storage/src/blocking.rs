//! Synchronous access to an async [`KvStore`].
//!
//! The ledger and the key manager are synchronous by contract: collaborators
//! call `append`, `encrypt` and `decrypt` from ordinary request handlers.
//! This module bridges those calls onto the async storage trait.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{StorageError, StorageResult};
use crate::kv::{KvStore, validate_namespace};

/// Run a storage future to completion from synchronous code.
///
/// - Inside a tokio runtime: runs the future on a scoped OS thread via the
///   current handle, so the caller does not trigger the "cannot `block_on`
///   from within a runtime" panic.
/// - Outside a runtime: creates a lightweight current-thread runtime.
///
/// # Errors
///
/// Returns [`StorageError::Backend`] if the helper thread panics or a
/// runtime cannot be created, otherwise whatever the future returns.
pub fn block_on<F, T>(f: F) -> StorageResult<T>
where
    F: std::future::Future<Output = StorageResult<T>> + Send,
    T: Send,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => std::thread::scope(|s| {
            s.spawn(|| handle.block_on(f))
                .join()
                .map_err(|_| StorageError::Backend("storage thread panicked".into()))?
        }),
        Err(_) => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StorageError::Backend(format!("failed to create runtime: {e}")))?
            .block_on(f),
    }
}

/// A namespace-bound, synchronous view over a [`KvStore`].
///
/// Cloning is cheap; clones share the underlying store.
#[derive(Clone)]
pub struct BlockingKvStore {
    store: Arc<dyn KvStore>,
    namespace: String,
}

impl std::fmt::Debug for BlockingKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingKvStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl BlockingKvStore {
    /// Bind `store` to `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if the namespace is empty or
    /// contains a null byte.
    pub fn new(store: Arc<dyn KvStore>, namespace: impl Into<String>) -> StorageResult<Self> {
        let namespace = namespace.into();
        validate_namespace(&namespace)?;
        Ok(Self { store, namespace })
    }

    /// A sibling view on the same store under a different namespace.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] for an invalid namespace.
    pub fn with_namespace(&self, namespace: impl Into<String>) -> StorageResult<Self> {
        Self::new(Arc::clone(&self.store), namespace)
    }

    /// The bound namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The underlying async store.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Get raw bytes.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    pub fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        block_on(self.store.get(&self.namespace, key))
    }

    /// Set raw bytes, overwriting.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the write fails.
    pub fn set(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        block_on(self.store.set(&self.namespace, key, value))
    }

    /// Write raw bytes only if `key` is not present yet.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the write fails.
    pub fn set_if_absent(&self, key: &str, value: Vec<u8>) -> StorageResult<bool> {
        block_on(self.store.set_if_absent(&self.namespace, key, value))
    }

    /// Commit several keys together.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the commit fails; nothing is written then.
    pub fn set_batch(&self, pairs: Vec<(String, Vec<u8>)>) -> StorageResult<()> {
        block_on(self.store.set_batch(&self.namespace, pairs))
    }

    /// Delete a key.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the delete fails.
    pub fn delete(&self, key: &str) -> StorageResult<bool> {
        block_on(self.store.delete(&self.namespace, key))
    }

    /// List keys in the bound namespace, ascending.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the scan fails.
    pub fn list_keys(&self) -> StorageResult<Vec<String>> {
        block_on(self.store.list_keys(&self.namespace))
    }

    /// Flush the underlying store.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the flush fails.
    pub fn flush(&self) -> StorageResult<()> {
        block_on(self.store.flush())
    }

    /// Get and deserialize a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if the stored bytes are not
    /// valid JSON for `T`.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.get(key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Serialize and store a JSON value, overwriting.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if `value` cannot be encoded.
    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> StorageResult<()> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.set(key, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    fn view(ns: &str) -> BlockingKvStore {
        BlockingKvStore::new(Arc::new(MemoryKvStore::new()), ns).unwrap()
    }

    #[test]
    fn test_blocking_outside_runtime() {
        let kv = view("test");
        kv.set("a", b"1".to_vec()).unwrap();
        assert_eq!(kv.get("a").unwrap(), Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn test_blocking_inside_runtime() {
        let kv = view("test");
        assert!(kv.set_if_absent("a", b"1".to_vec()).unwrap());
        assert!(!kv.set_if_absent("a", b"2".to_vec()).unwrap());
        assert_eq!(kv.list_keys().unwrap(), vec!["a"]);
    }

    #[test]
    fn test_json_helpers() {
        let kv = view("json");
        let sample = Sample {
            name: "x".into(),
            count: 3,
        };
        kv.set_json("s", &sample).unwrap();
        assert_eq!(kv.get_json::<Sample>("s").unwrap(), Some(sample));
        assert!(kv.get_json::<Sample>("missing").unwrap().is_none());
    }

    #[test]
    fn test_get_json_reports_bad_bytes() {
        let kv = view("json");
        kv.set("bad", b"not json".to_vec()).unwrap();
        assert!(matches!(
            kv.get_json::<Sample>("bad"),
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn test_sibling_namespace_shares_store() {
        let kv = view("one");
        let other = kv.with_namespace("two").unwrap();
        kv.set("k", b"1".to_vec()).unwrap();
        assert!(other.get("k").unwrap().is_none());
        assert_eq!(other.namespace(), "two");
    }

    #[test]
    fn test_rejects_empty_namespace() {
        assert!(BlockingKvStore::new(Arc::new(MemoryKvStore::new()), "").is_err());
    }
}
