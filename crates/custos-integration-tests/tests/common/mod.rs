//! Shared fixtures for the integration tests.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use custos_audit::{
    AuditEntry, AuditEvent, AuditLedger, BaselineStore, ENTRY_NAMESPACE, KvAuditStorage,
    LedgerSettings, SecurityNotifier, TracingNotifier, entry_key,
};
use custos_core::{ActorId, Timestamp};
use custos_crypto::{Secret32, SigningKey};
use custos_keys::{KeyManager, KvKeyStore, PolicySet};
use custos_storage::BlockingKvStore;

/// A ledger over in-memory storage, with the storage handle kept for tampering.
#[allow(dead_code)]
pub struct LedgerFixture {
    /// The ledger.
    pub ledger: Arc<AuditLedger>,
    /// Its storage.
    pub storage: Arc<KvAuditStorage>,
    /// Its signing key.
    pub key: SigningKey,
}

#[allow(dead_code)]
impl LedgerFixture {
    /// Fresh, empty ledger with default scoring.
    pub fn new() -> Self {
        Self::with_notifier(Arc::new(TracingNotifier))
    }

    /// Fresh, empty ledger delivering alerts to `notifier`.
    pub fn with_notifier(notifier: Arc<dyn SecurityNotifier>) -> Self {
        let storage = Arc::new(KvAuditStorage::in_memory().unwrap());
        let key = SigningKey::generate();
        let ledger = AuditLedger::open(
            Arc::clone(&storage) as _,
            key.clone(),
            Arc::new(BaselineStore::in_memory()),
            notifier,
            LedgerSettings::default(),
        )
        .unwrap();
        Self {
            ledger: Arc::new(ledger),
            storage,
            key,
        }
    }

    /// Overwrite a stored entry, bypassing the write-once guard.
    pub fn overwrite(&self, entry: &AuditEntry) {
        BlockingKvStore::new(Arc::clone(self.storage.kv()), ENTRY_NAMESPACE)
            .unwrap()
            .set_json(&entry_key(entry.sequence_number), entry)
            .unwrap();
    }
}

/// A key manager over in-memory storage with cheap exports.
#[allow(dead_code)]
pub fn key_manager(policies: PolicySet) -> Arc<KeyManager> {
    Arc::new(
        KeyManager::open(Arc::new(KvKeyStore::in_memory()), policies, Secret32::generate())
            .unwrap()
            .with_export_iterations(1_000),
    )
}

/// Shorthand for a valid actor ID.
#[allow(dead_code)]
pub fn actor(id: &str) -> ActorId {
    ActorId::new(id).unwrap()
}

/// 14 April 2026 at `hour`:00 UTC.
#[allow(dead_code)]
pub fn at_hour(hour: u32) -> Timestamp {
    Timestamp::from_datetime(Utc.with_ymd_and_hms(2026, 4, 14, hour, 0, 0).unwrap())
}

/// A daytime event for `actor_id`.
#[allow(dead_code)]
pub fn daytime(actor_id: &str, action: &str) -> AuditEvent {
    AuditEvent::new(actor(actor_id), action).occurred_at(at_hour(11))
}
