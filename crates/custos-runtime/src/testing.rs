//! Shared fixtures for the runtime's unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use custos_audit::{
    AuditEntry, AuditError, AuditLedger, AuditResult, AuditStorage, BaselineStore,
    ENTRY_NAMESPACE, InvestigationRecord, KvAuditStorage, LedgerSettings, StoredEntry,
    TracingNotifier, entry_key,
};
use custos_core::ActorId;
use custos_crypto::{Secret32, SigningKey};
use custos_keys::{KeyManager, KvKeyStore, PolicySet};
use custos_storage::BlockingKvStore;

/// In-memory audit storage that can be tampered with or made to refuse writes.
pub(crate) struct TamperableStorage {
    inner: KvAuditStorage,
    fail_writes: AtomicBool,
}

impl TamperableStorage {
    pub(crate) fn new() -> Self {
        Self {
            inner: KvAuditStorage::in_memory().unwrap(),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Rewrite the actor of a stored entry without resealing it.
    pub(crate) fn tamper(&self, sequence: u64) {
        let mut entry = self.inner.get_entry(sequence).unwrap().unwrap();
        entry.actor = ActorId::new("mallory").unwrap();
        BlockingKvStore::new(Arc::clone(self.inner.kv()), ENTRY_NAMESPACE)
            .unwrap()
            .set_json(&entry_key(sequence), &entry)
            .unwrap();
    }
}

impl AuditStorage for TamperableStorage {
    fn put_entry(&self, entry: &AuditEntry) -> AuditResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AuditError::PersistenceFailure("disk full".into()));
        }
        self.inner.put_entry(entry)
    }
    fn get_entry(&self, sequence: u64) -> AuditResult<Option<AuditEntry>> {
        self.inner.get_entry(sequence)
    }
    fn scan(&self, from: u64, to: u64) -> AuditResult<Vec<StoredEntry>> {
        self.inner.scan(from, to)
    }
    fn head(&self) -> AuditResult<Option<u64>> {
        self.inner.head()
    }
    fn set_head(&self, sequence: u64) -> AuditResult<()> {
        self.inner.set_head(sequence)
    }
    fn append_investigation(&self, record: &InvestigationRecord) -> AuditResult<()> {
        self.inner.append_investigation(record)
    }
    fn investigations(&self, sequence: u64) -> AuditResult<Vec<InvestigationRecord>> {
        self.inner.investigations(sequence)
    }
    fn flush(&self) -> AuditResult<()> {
        self.inner.flush()
    }
}

pub(crate) struct Harness {
    pub(crate) keys: Arc<KeyManager>,
    pub(crate) ledger: Arc<AuditLedger>,
    pub(crate) storage: Arc<TamperableStorage>,
}

pub(crate) fn harness() -> Harness {
    harness_with_policies(PolicySet::default())
}

pub(crate) fn harness_with_policies(policies: PolicySet) -> Harness {
    let storage = Arc::new(TamperableStorage::new());
    let ledger = AuditLedger::open(
        Arc::clone(&storage) as Arc<dyn AuditStorage>,
        SigningKey::generate(),
        Arc::new(BaselineStore::in_memory()),
        Arc::new(TracingNotifier),
        LedgerSettings::default(),
    )
    .unwrap();
    let keys = KeyManager::open(Arc::new(KvKeyStore::in_memory()), policies, Secret32::generate())
        .unwrap()
        .with_export_iterations(1_000);
    Harness {
        keys: Arc::new(keys),
        ledger: Arc::new(ledger),
        storage,
    }
}
