//! Namespaced byte store and its backends.
//!
//! The ledger keeps entries, the head pointer, baselines and investigations
//! under `audit:*` namespaces; the key manager keeps its records under
//! `keys:*`. Entry keys are zero-padded sequence numbers, so ascending key
//! order is append order on every backend.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};

/// Separates namespace and key in the persistent encoding.
const SEPARATOR: u8 = 0;

/// A checked `(namespace, key)` pair.
///
/// Neither part may be empty or contain the separator byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StorageKey<'a> {
    namespace: &'a str,
    key: &'a str,
}

fn check_part(kind: &str, value: &str) -> StorageResult<()> {
    if value.is_empty() {
        return Err(StorageError::InvalidKey(format!("{kind} is empty")));
    }
    if value.as_bytes().contains(&SEPARATOR) {
        return Err(StorageError::InvalidKey(format!(
            "{kind} {value:?} contains a null byte"
        )));
    }
    Ok(())
}

/// Check a namespace on its own (used when binding a view).
pub(crate) fn validate_namespace(namespace: &str) -> StorageResult<()> {
    check_part("namespace", namespace)
}

impl<'a> StorageKey<'a> {
    pub(crate) fn new(namespace: &'a str, key: &'a str) -> StorageResult<Self> {
        check_part("namespace", namespace)?;
        check_part("key", key)?;
        Ok(Self { namespace, key })
    }

    #[cfg(feature = "kv")]
    fn encode(self) -> Vec<u8> {
        let mut buf = namespace_prefix(self.namespace);
        buf.extend_from_slice(self.key.as_bytes());
        buf
    }

    fn owned(self) -> (String, String) {
        (self.namespace.to_owned(), self.key.to_owned())
    }
}

/// `namespace` followed by the separator: every key of the namespace starts
/// with it, and `namespace` followed by `SEPARATOR + 1` bounds the range.
#[cfg(feature = "kv")]
fn namespace_prefix(namespace: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(namespace.len().saturating_add(1));
    buf.extend_from_slice(namespace.as_bytes());
    buf.push(SEPARATOR);
    buf
}

/// Byte-level storage scoped by namespace.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Value under `key`, if any.
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Write `value`, replacing any previous value.
    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Write `value` only if `key` is absent. Returns `false` and writes
    /// nothing otherwise. Check and write are one atomic step.
    async fn set_if_absent(&self, namespace: &str, key: &str, value: Vec<u8>)
    -> StorageResult<bool>;

    /// Commit several keys of one namespace together: all or none.
    async fn set_batch(&self, namespace: &str, pairs: Vec<(String, Vec<u8>)>)
    -> StorageResult<()>;

    /// Remove `key`. Returns whether it existed.
    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool>;

    /// Keys of `namespace` in ascending byte order.
    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>>;

    /// Make every acknowledged write durable.
    async fn flush(&self) -> StorageResult<()>;
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

type Table = BTreeMap<(String, String), Vec<u8>>;

/// Volatile store for tests and deployments without a data directory.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    table: std::sync::RwLock<Table>,
}

impl MemoryKvStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StorageResult<std::sync::RwLockReadGuard<'_, Table>> {
        self.table
            .read()
            .map_err(|e| StorageError::Backend(format!("memory store poisoned: {e}")))
    }

    fn write(&self) -> StorageResult<std::sync::RwLockWriteGuard<'_, Table>> {
        self.table
            .write()
            .map_err(|e| StorageError::Backend(format!("memory store poisoned: {e}")))
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let k = StorageKey::new(namespace, key)?.owned();
        Ok(self.read()?.get(&k).cloned())
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let k = StorageKey::new(namespace, key)?.owned();
        self.write()?.insert(k, value);
        Ok(())
    }

    async fn set_if_absent(
        &self,
        namespace: &str,
        key: &str,
        value: Vec<u8>,
    ) -> StorageResult<bool> {
        let k = StorageKey::new(namespace, key)?.owned();
        let mut table = self.write()?;
        if table.contains_key(&k) {
            return Ok(false);
        }
        table.insert(k, value);
        Ok(true)
    }

    async fn set_batch(
        &self,
        namespace: &str,
        pairs: Vec<(String, Vec<u8>)>,
    ) -> StorageResult<()> {
        let checked = pairs
            .iter()
            .map(|(key, _)| StorageKey::new(namespace, key).map(StorageKey::owned))
            .collect::<StorageResult<Vec<_>>>()?;
        let mut table = self.write()?;
        for (k, (_, value)) in checked.into_iter().zip(pairs) {
            table.insert(k, value);
        }
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        let k = StorageKey::new(namespace, key)?.owned();
        Ok(self.write()?.remove(&k).is_some())
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        validate_namespace(namespace)?;
        let start = (namespace.to_owned(), String::new());
        Ok(self
            .read()?
            .range(start..)
            .map_while(|((ns, key), _)| (ns == namespace).then(|| key.clone()))
            .collect())
    }

    async fn flush(&self) -> StorageResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SurrealKV
// ---------------------------------------------------------------------------

/// Embedded LSM-tree store (`SurrealKV`). Each write commits its own
/// transaction; batches share one.
#[cfg(feature = "kv")]
pub struct SurrealKvStore {
    tree: surrealkv::Tree,
}

#[cfg(feature = "kv")]
impl std::fmt::Debug for SurrealKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurrealKvStore").finish_non_exhaustive()
    }
}

#[cfg(feature = "kv")]
fn backend(e: surrealkv::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

#[cfg(feature = "kv")]
impl SurrealKvStore {
    /// Open (or create) the store in directory `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the directory cannot be used.
    pub fn open(path: impl AsRef<std::path::Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let tree = surrealkv::TreeBuilder::new()
            .with_path(path.to_path_buf())
            .build()
            .map_err(|e| StorageError::Open {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(path = %path.display(), "Opened SurrealKV store");
        Ok(Self { tree })
    }
}

#[cfg(feature = "kv")]
#[async_trait]
impl KvStore for SurrealKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let k = StorageKey::new(namespace, key)?.encode();
        self.tree
            .begin_with_mode(surrealkv::Mode::ReadOnly)
            .map_err(backend)?
            .get(&k)
            .map_err(backend)
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let k = StorageKey::new(namespace, key)?.encode();
        let mut tx = self.tree.begin().map_err(backend)?;
        tx.set(&k, &value).map_err(backend)?;
        tx.commit().await.map_err(backend)
    }

    async fn set_if_absent(
        &self,
        namespace: &str,
        key: &str,
        value: Vec<u8>,
    ) -> StorageResult<bool> {
        let k = StorageKey::new(namespace, key)?.encode();
        let mut tx = self.tree.begin().map_err(backend)?;
        if tx.get(&k).map_err(backend)?.is_some() {
            return Ok(false);
        }
        tx.set(&k, &value).map_err(backend)?;
        tx.commit().await.map_err(backend)?;
        Ok(true)
    }

    async fn set_batch(
        &self,
        namespace: &str,
        pairs: Vec<(String, Vec<u8>)>,
    ) -> StorageResult<()> {
        let encoded = pairs
            .iter()
            .map(|(key, _)| StorageKey::new(namespace, key).map(StorageKey::encode))
            .collect::<StorageResult<Vec<_>>>()?;
        let mut tx = self.tree.begin().map_err(backend)?;
        for (k, (_, value)) in encoded.iter().zip(&pairs) {
            tx.set(k, value).map_err(backend)?;
        }
        tx.commit().await.map_err(backend)
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        let k = StorageKey::new(namespace, key)?.encode();
        let mut tx = self.tree.begin().map_err(backend)?;
        if tx.get(&k).map_err(backend)?.is_none() {
            return Ok(false);
        }
        tx.delete(&k).map_err(backend)?;
        tx.commit().await.map_err(backend)?;
        Ok(true)
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        validate_namespace(namespace)?;
        let start = namespace_prefix(namespace);
        let mut end = start.clone();
        if let Some(last) = end.last_mut() {
            *last = SEPARATOR.saturating_add(1);
        }

        let tx = self
            .tree
            .begin_with_mode(surrealkv::Mode::ReadOnly)
            .map_err(backend)?;
        let mut iter = tx.range(&start, &end).map_err(backend)?;
        iter.seek_first().map_err(backend)?;
        let mut keys = Vec::new();
        while iter.valid() {
            let raw = iter.key();
            if let Some(suffix) = raw.get(start.len()..)
                && let Ok(key) = std::str::from_utf8(suffix)
                && !key.is_empty()
            {
                keys.push(key.to_owned());
            }
            iter.next().map_err(backend)?;
        }
        Ok(keys)
    }

    async fn flush(&self) -> StorageResult<()> {
        // Commits are already durable.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_once_keeps_first_value() {
        let store = MemoryKvStore::new();
        assert!(store.set_if_absent("audit:entries", "00000000000000000001", b"first".to_vec()).await.unwrap());
        assert!(!store.set_if_absent("audit:entries", "00000000000000000001", b"second".to_vec()).await.unwrap());
        assert_eq!(
            store.get("audit:entries", "00000000000000000001").await.unwrap(),
            Some(b"first".to_vec())
        );
    }

    #[tokio::test]
    async fn test_set_overwrites_and_delete_reports_presence() {
        let store = MemoryKvStore::new();
        store.set("audit:meta", "head", b"1".to_vec()).await.unwrap();
        store.set("audit:meta", "head", b"2".to_vec()).await.unwrap();
        assert_eq!(store.get("audit:meta", "head").await.unwrap(), Some(b"2".to_vec()));
        assert!(store.delete("audit:meta", "head").await.unwrap());
        assert!(!store.delete("audit:meta", "head").await.unwrap());
        assert!(store.get("audit:meta", "head").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_batch_with_bad_key_writes_nothing() {
        let store = MemoryKvStore::new();
        let result = store
            .set_batch(
                "keys:records",
                vec![("a".into(), b"1".to_vec()), (String::new(), b"2".to_vec())],
            )
            .await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
        assert!(store.get("keys:records", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_keys_is_sorted_and_scoped() {
        let store = MemoryKvStore::new();
        store.set("audit:entries", "00000000000000000002", vec![]).await.unwrap();
        store.set("audit:entries", "00000000000000000001", vec![]).await.unwrap();
        store.set("audit:entries:x", "z", vec![]).await.unwrap();
        store.set("audit", "y", vec![]).await.unwrap();
        store.set("keys:records", "k", vec![]).await.unwrap();
        assert_eq!(
            store.list_keys("audit:entries").await.unwrap(),
            vec!["00000000000000000001", "00000000000000000002"]
        );
    }

    #[test]
    fn test_storage_key_rejects_empty_and_null() {
        assert!(StorageKey::new("", "k").is_err());
        assert!(StorageKey::new("ns", "").is_err());
        assert!(StorageKey::new("ns\0x", "k").is_err());
        assert!(StorageKey::new("ns", "k\0x").is_err());
        assert!(StorageKey::new("audit:entries", "1").is_ok());
    }

    #[cfg(feature = "kv")]
    #[tokio::test]
    async fn test_surrealkv_round_trip_and_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let store = SurrealKvStore::open(dir.path()).unwrap();
        assert!(store.set_if_absent("audit:entries", "1", b"a".to_vec()).await.unwrap());
        assert!(!store.set_if_absent("audit:entries", "1", b"b".to_vec()).await.unwrap());
        store
            .set_batch("keys:records", vec![("k2".into(), vec![2]), ("k1".into(), vec![1])])
            .await
            .unwrap();
        assert_eq!(store.list_keys("keys:records").await.unwrap(), vec!["k1", "k2"]);
        assert_eq!(store.list_keys("audit:entries").await.unwrap(), vec!["1"]);
        assert_eq!(store.get("audit:entries", "1").await.unwrap(), Some(b"a".to_vec()));
    }
}
