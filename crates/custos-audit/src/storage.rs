//! Durable storage of ledger entries.
//!
//! Entries are written once with `set_if_absent`, so the backend itself
//! refuses to overwrite history. A head pointer records the last appended
//! sequence number; it is advisory (the ledger scans past it on open) so a
//! failed pointer write never loses entries.

use std::path::Path;
use std::sync::Arc;

use custos_storage::{BlockingKvStore, KvStore, MemoryKvStore};

use crate::entry::AuditEntry;
use crate::error::{AuditError, AuditResult};
use crate::investigation::{InvestigationRecord, sequence_prefix};

/// Namespace holding entries keyed by [`entry_key`].
pub const ENTRY_NAMESPACE: &str = "audit:entries";
const META_NAMESPACE: &str = "audit:meta";
const INVESTIGATION_NAMESPACE: &str = "audit:investigations";
const HEAD_KEY: &str = "head";

/// Storage key of an entry: zero-padded so keys sort numerically.
#[must_use]
pub fn entry_key(sequence: u64) -> String {
    format!("{sequence:020}")
}

/// A stored entry as found during a scan.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    /// Sequence number taken from the storage key.
    pub key_sequence: u64,
    /// The decoded entry, or the decode error.
    pub entry: Result<AuditEntry, String>,
}

/// Persistence for the ledger.
pub trait AuditStorage: Send + Sync {
    /// Write a new entry.
    ///
    /// # Errors
    ///
    /// [`AuditError::EntryAlreadyExists`] if the sequence is taken, or
    /// [`AuditError::PersistenceFailure`] if the write fails.
    fn put_entry(&self, entry: &AuditEntry) -> AuditResult<()>;

    /// Read one entry.
    ///
    /// # Errors
    ///
    /// Returns a storage or decode error.
    fn get_entry(&self, sequence: u64) -> AuditResult<Option<AuditEntry>>;

    /// All stored entries with `from <= key <= to`, ascending by key.
    ///
    /// Undecodable entries are returned as errors rather than skipped.
    ///
    /// # Errors
    ///
    /// Returns a storage error if listing fails.
    fn scan(&self, from: u64, to: u64) -> AuditResult<Vec<StoredEntry>>;

    /// Last sequence number recorded by [`set_head`](Self::set_head).
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    fn head(&self) -> AuditResult<Option<u64>>;

    /// Record the last appended sequence number.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    fn set_head(&self, sequence: u64) -> AuditResult<()>;

    /// Append an investigation record.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    fn append_investigation(&self, record: &InvestigationRecord) -> AuditResult<()>;

    /// Investigation records for one sequence number, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a storage or decode error.
    fn investigations(&self, sequence: u64) -> AuditResult<Vec<InvestigationRecord>>;

    /// Flush buffered writes.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    fn flush(&self) -> AuditResult<()>;
}

/// [`AuditStorage`] over a namespaced [`KvStore`].
pub struct KvAuditStorage {
    entries: BlockingKvStore,
    meta: BlockingKvStore,
    investigations: BlockingKvStore,
}

impl std::fmt::Debug for KvAuditStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvAuditStorage").finish_non_exhaustive()
    }
}

impl KvAuditStorage {
    /// Store entries in `store`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::PersistenceFailure`] if a namespace is rejected.
    pub fn new(store: Arc<dyn KvStore>) -> AuditResult<Self> {
        let entries = BlockingKvStore::new(store, ENTRY_NAMESPACE)?;
        Ok(Self {
            meta: entries.with_namespace(META_NAMESPACE)?,
            investigations: entries.with_namespace(INVESTIGATION_NAMESPACE)?,
            entries,
        })
    }

    /// Volatile storage for tests and ephemeral deployments.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches [`new`](Self::new).
    pub fn in_memory() -> AuditResult<Self> {
        Self::new(Arc::new(MemoryKvStore::new()))
    }

    /// Open a persistent store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::PersistenceFailure`] if the database cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let store = custos_storage::SurrealKvStore::open(path)?;
        Self::new(Arc::new(store))
    }

    /// The underlying key-value store.
    #[must_use]
    pub fn kv(&self) -> &Arc<dyn KvStore> {
        self.entries.inner()
    }
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, String> {
    serde_json::from_slice(bytes).map_err(|e| e.to_string())
}

impl AuditStorage for KvAuditStorage {
    fn put_entry(&self, entry: &AuditEntry) -> AuditResult<()> {
        let bytes =
            serde_json::to_vec(entry).map_err(|e| AuditError::Serialization(e.to_string()))?;
        if self
            .entries
            .set_if_absent(&entry_key(entry.sequence_number), bytes)?
        {
            Ok(())
        } else {
            Err(AuditError::EntryAlreadyExists {
                sequence: entry.sequence_number,
            })
        }
    }

    fn get_entry(&self, sequence: u64) -> AuditResult<Option<AuditEntry>> {
        Ok(self.entries.get_json(&entry_key(sequence))?)
    }

    fn scan(&self, from: u64, to: u64) -> AuditResult<Vec<StoredEntry>> {
        let mut found = Vec::new();
        for key in self.entries.list_keys()? {
            let Ok(key_sequence) = key.parse::<u64>() else {
                continue;
            };
            if key_sequence < from || key_sequence > to {
                continue;
            }
            let entry = match self.entries.get(&key)? {
                Some(bytes) => decode::<AuditEntry>(&bytes),
                None => continue,
            };
            found.push(StoredEntry {
                key_sequence,
                entry,
            });
        }
        found.sort_by_key(|s| s.key_sequence);
        Ok(found)
    }

    fn head(&self) -> AuditResult<Option<u64>> {
        Ok(self.meta.get_json(HEAD_KEY)?)
    }

    fn set_head(&self, sequence: u64) -> AuditResult<()> {
        Ok(self.meta.set_json(HEAD_KEY, &sequence)?)
    }

    fn append_investigation(&self, record: &InvestigationRecord) -> AuditResult<()> {
        let bytes =
            serde_json::to_vec(record).map_err(|e| AuditError::Serialization(e.to_string()))?;
        self.investigations
            .set_if_absent(&record.storage_key(), bytes)?;
        Ok(())
    }

    fn investigations(&self, sequence: u64) -> AuditResult<Vec<InvestigationRecord>> {
        let prefix = format!("{}:", sequence_prefix(sequence));
        let mut records = Vec::new();
        for key in self.investigations.list_keys()? {
            if !key.starts_with(&prefix) {
                continue;
            }
            if let Some(record) = self.investigations.get_json::<InvestigationRecord>(&key)? {
                records.push(record);
            }
        }
        records.sort_by_key(|r| r.raised_at);
        Ok(records)
    }

    fn flush(&self) -> AuditResult<()> {
        Ok(self.entries.flush()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::investigation::InvestigationStatus;
    use custos_core::{ActorId, Timestamp};
    use custos_crypto::SigningKey;

    #[test]
    fn test_entries_are_write_once() {
        let storage = KvAuditStorage::in_memory().unwrap();
        let entry = AuditEntry::sample(&SigningKey::generate(), "ann", "login", Timestamp::now());
        storage.put_entry(&entry).unwrap();
        assert!(matches!(
            storage.put_entry(&entry),
            Err(AuditError::EntryAlreadyExists { sequence: 1 })
        ));
        assert_eq!(storage.get_entry(1).unwrap(), Some(entry));
        assert_eq!(storage.get_entry(2).unwrap(), None);
    }

    #[test]
    fn test_scan_reports_corrupt_entries() {
        let storage = KvAuditStorage::in_memory().unwrap();
        let entry = AuditEntry::sample(&SigningKey::generate(), "ann", "login", Timestamp::now());
        storage.put_entry(&entry).unwrap();
        let raw = BlockingKvStore::new(storage.kv().clone(), ENTRY_NAMESPACE).unwrap();
        raw.set(&entry_key(2), b"not json".to_vec()).unwrap();

        let scanned = storage.scan(1, u64::MAX).unwrap();
        assert_eq!(scanned.len(), 2);
        assert!(scanned[0].entry.is_ok());
        assert_eq!(scanned[1].key_sequence, 2);
        assert!(scanned[1].entry.is_err());
        assert_eq!(storage.scan(2, 2).unwrap().len(), 1);
    }

    #[test]
    fn test_head_pointer() {
        let storage = KvAuditStorage::in_memory().unwrap();
        assert_eq!(storage.head().unwrap(), None);
        storage.set_head(41).unwrap();
        assert_eq!(storage.head().unwrap(), Some(41));
    }

    #[test]
    fn test_investigations_by_sequence() {
        let storage = KvAuditStorage::in_memory().unwrap();
        for seq in [1, 2, 1] {
            let record = InvestigationRecord::new(
                seq,
                InvestigationStatus::Suspicious,
                "alert",
                ActorId::system(),
            );
            storage.append_investigation(&record).unwrap();
        }
        assert_eq!(storage.investigations(1).unwrap().len(), 2);
        assert_eq!(storage.investigations(2).unwrap().len(), 1);
        assert!(storage.investigations(10).unwrap().is_empty());
    }
}
