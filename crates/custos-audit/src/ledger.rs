//! The append-only audit ledger.
//!
//! Appends are serialised by one mutex over the chain head. Scoring and
//! threat evaluation happen before the lock; the critical section covers
//! sequence assignment, hashing, signing and the persist call. The in-memory
//! head only advances after the entry is durably written, so a failed write
//! never consumes a sequence number.

use std::sync::{Arc, Mutex, MutexGuard};

use custos_core::{ActorId, Timestamp};
use custos_crypto::{ContentHash, SigningKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::baseline::BaselineStore;
use crate::entry::{AuditEntry, AuditEvent, Scores};
use crate::error::{AuditError, AuditResult};
use crate::investigation::{
    InvestigationRecord, InvestigationStatus, LEDGER_SEQUENCE, current_status,
};
use crate::notifier::{SecurityAlert, SecurityNotifier};
use crate::query::{AuditFilter, QueryPage};
use crate::scoring::ScoringConfig;
use crate::storage::AuditStorage;
use crate::threat::{ThreatConfig, ThreatDetector};
use crate::verify::{ChainVerificationReport, IntegrityVerifier};

/// Tunables for scoring and threat detection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Anomaly and risk scoring.
    pub scoring: ScoringConfig,
    /// Threat rules.
    pub threats: ThreatConfig,
}

#[derive(Debug, Clone, Copy)]
struct ChainHead {
    last_sequence: u64,
    last_hash: ContentHash,
}

/// Hash-chained, signed, append-only audit log.
pub struct AuditLedger {
    storage: Arc<dyn AuditStorage>,
    signing_key: SigningKey,
    baselines: Arc<BaselineStore>,
    notifier: Arc<dyn SecurityNotifier>,
    scoring: ScoringConfig,
    threats: ThreatDetector,
    head: Mutex<ChainHead>,
}

impl std::fmt::Debug for AuditLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLedger")
            .field("signing_key", &self.signing_key)
            .field("scoring", &self.scoring)
            .finish_non_exhaustive()
    }
}

/// Find the last entry: start at the head pointer and walk forward past it.
fn recover_head(storage: &dyn AuditStorage) -> AuditResult<ChainHead> {
    let pointer = storage.head()?.unwrap_or(0);
    let mut head = ChainHead {
        last_sequence: 0,
        last_hash: ContentHash::zero(),
    };
    if pointer > 0 {
        let entry = storage
            .get_entry(pointer)?
            .ok_or_else(|| AuditError::ChainIntegrityViolation {
                sequence: pointer,
                reason: "entry named by the head pointer is missing".into(),
            })?;
        head = ChainHead {
            last_sequence: pointer,
            last_hash: entry.integrity_hash,
        };
    }

    while let Some(next) = head.last_sequence.checked_add(1)
        && let Some(entry) = storage.get_entry(next)?
    {
        if entry.previous_hash != head.last_hash {
            error!(
                sequence = next,
                "Entry beyond the head pointer does not link to its predecessor"
            );
        }
        head = ChainHead {
            last_sequence: next,
            last_hash: entry.integrity_hash,
        };
    }

    if head.last_sequence != pointer {
        info!(
            pointer,
            recovered = head.last_sequence,
            "Recovered audit head beyond stored pointer"
        );
        if let Err(e) = storage.set_head(head.last_sequence) {
            warn!(error = %e, "Failed to update audit head pointer");
        }
    }
    Ok(head)
}

impl AuditLedger {
    /// Open a ledger over `storage`, recovering the chain head.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::ChainIntegrityViolation`] if the head pointer
    /// names a missing entry, or a storage error.
    pub fn open(
        storage: Arc<dyn AuditStorage>,
        signing_key: SigningKey,
        baselines: Arc<BaselineStore>,
        notifier: Arc<dyn SecurityNotifier>,
        settings: LedgerSettings,
    ) -> AuditResult<Self> {
        let head = recover_head(storage.as_ref())?;
        info!(
            head = head.last_sequence,
            signing_key = %signing_key.key_id(),
            "Audit ledger opened"
        );
        Ok(Self {
            storage,
            signing_key,
            baselines,
            notifier,
            scoring: settings.scoring,
            threats: ThreatDetector::new(settings.threats),
            head: Mutex::new(head),
        })
    }

    fn lock_head(&self) -> AuditResult<MutexGuard<'_, ChainHead>> {
        self.head
            .lock()
            .map_err(|e| AuditError::Internal(format!("chain head lock poisoned: {e}")))
    }

    /// Score, seal and persist an event.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::PersistenceFailure`] if the entry could not be
    /// written; the sequence number is not consumed and the caller must
    /// decide whether to retry.
    pub fn append(&self, event: AuditEvent) -> AuditResult<AuditEntry> {
        let scored_at = event.occurred_at.unwrap_or_else(Timestamp::now);
        let baseline = self.baselines.get(&event.actor)?;
        let anomaly = self
            .scoring
            .anomaly(&event, scored_at.hour(), baseline.as_ref());
        let (risk_score, risk_level) = self.scoring.risk(&event, anomaly.score);
        let threat_indicators = self.threats.evaluate(&event, scored_at, anomaly.off_hours)?;
        let scores = Scores {
            anomaly_score: anomaly.score,
            risk_score,
            risk_level,
            threat_indicators,
        };

        let entry = {
            let mut head = self.lock_head()?;
            let sequence = head
                .last_sequence
                .checked_add(1)
                .ok_or_else(|| AuditError::Internal("sequence numbers exhausted".into()))?;
            let entry = AuditEntry::seal(
                event,
                sequence,
                Timestamp::now(),
                scores,
                head.last_hash,
                &self.signing_key,
            )?;
            if let Err(e) = self.storage.put_entry(&entry) {
                error!(
                    sequence,
                    actor = %entry.actor,
                    action = %entry.action,
                    error = %e,
                    "Failed to persist audit entry"
                );
                return Err(e);
            }
            if let Err(e) = self.storage.set_head(sequence) {
                warn!(sequence, error = %e, "Failed to update audit head pointer");
            }
            head.last_sequence = sequence;
            head.last_hash = entry.integrity_hash;
            entry
        };

        debug!(
            sequence = entry.sequence_number,
            actor = %entry.actor,
            action = %entry.action,
            risk_score = entry.risk_score,
            anomaly_score = entry.anomaly_score,
            "Appended audit entry"
        );

        if self
            .scoring
            .should_alert(entry.risk_score, entry.anomaly_score)
            || !entry.threat_indicators.is_empty()
        {
            self.raise_alert(&entry);
        }
        if let Err(e) = self.baselines.record(&entry, &self.scoring) {
            warn!(actor = %entry.actor, error = %e, "Failed to update behavioral baseline");
        }
        Ok(entry)
    }

    fn raise_alert(&self, entry: &AuditEntry) {
        let alert = SecurityAlert::for_entry(entry);
        if let Err(e) = self.notifier.notify(&alert) {
            warn!(sequence = entry.sequence_number, error = %e, "Security notifier failed");
        }
        let record = InvestigationRecord::new(
            entry.sequence_number,
            InvestigationStatus::Suspicious,
            alert.summary(),
            ActorId::system(),
        );
        if let Err(e) = self.storage.append_investigation(&record) {
            warn!(
                sequence = entry.sequence_number,
                error = %e,
                "Failed to record suspicious entry"
            );
        }
    }

    /// Filtered, paginated read.
    ///
    /// Undecodable entries are skipped with a warning; use
    /// [`verify_range`](Self::verify_range) to surface them.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend cannot be read.
    pub fn query(&self, filter: &AuditFilter) -> AuditResult<QueryPage> {
        let from = filter.from_sequence.unwrap_or(1);
        let to = filter.to_sequence.unwrap_or(u64::MAX);
        let mut matching = Vec::new();
        for stored in self.storage.scan(from, to)? {
            match stored.entry {
                Ok(entry) if filter.matches(&entry) => matching.push(entry),
                Ok(_) => {},
                Err(e) => {
                    warn!(sequence = stored.key_sequence, error = %e, "Skipping unreadable audit entry");
                },
            }
        }
        if filter.newest_first {
            matching.reverse();
        }
        Ok(QueryPage::paginate(matching, filter))
    }

    /// One entry by sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::EntryNotFound`] if absent.
    pub fn get(&self, sequence: u64) -> AuditResult<AuditEntry> {
        self.storage
            .get_entry(sequence)?
            .ok_or(AuditError::EntryNotFound { sequence })
    }

    /// The most recent entry.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn head(&self) -> AuditResult<Option<AuditEntry>> {
        let last = self.count()?;
        if last == 0 {
            return Ok(None);
        }
        self.storage.get_entry(last)
    }

    /// Number of entries appended (equal to the last sequence number).
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Internal`] on a poisoned lock.
    pub fn count(&self) -> AuditResult<u64> {
        Ok(self.lock_head()?.last_sequence)
    }

    /// The newest entries whose anomaly score reached the alert threshold.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn high_anomaly_entries(&self, limit: usize) -> AuditResult<Vec<AuditEntry>> {
        let filter = AuditFilter::new()
            .min_anomaly(self.scoring.anomaly_alert_threshold)
            .newest_first()
            .page(0, limit);
        Ok(self.query(&filter)?.entries)
    }

    /// A verifier over this ledger's storage and key.
    #[must_use]
    pub fn verifier(&self) -> IntegrityVerifier {
        IntegrityVerifier::new(Arc::clone(&self.storage)).with_signing_key(self.signing_key.clone())
    }

    /// Verify `from..=to`. An invalid chain puts the ledger under investigation.
    ///
    /// # Errors
    ///
    /// Returns a storage error if verification could not run.
    pub fn verify_range(&self, from: u64, to: u64) -> AuditResult<ChainVerificationReport> {
        let report = self.verifier().verify_range(from, to)?;
        if !report.is_valid {
            let reason = match (report.broken_chain_at, report.issues.first()) {
                (Some(at), Some(issue)) => format!("chain broken at {at}: {issue}"),
                _ => "chain verification failed".to_string(),
            };
            let record = InvestigationRecord::new(
                LEDGER_SEQUENCE,
                InvestigationStatus::UnderInvestigation,
                reason,
                ActorId::system(),
            );
            if let Err(e) = self.storage.append_investigation(&record) {
                error!(error = %e, "Failed to flag ledger for investigation");
            }
        }
        Ok(report)
    }

    /// Mark an entry (or the ledger, with sequence 0) as under investigation.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::EntryNotFound`] for an unknown sequence number.
    pub fn flag_for_investigation(
        &self,
        sequence: u64,
        reason: &str,
        raised_by: ActorId,
    ) -> AuditResult<InvestigationRecord> {
        self.set_investigation(sequence, InvestigationStatus::UnderInvestigation, reason, raised_by)
    }

    /// Close an investigation.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::EntryNotFound`] for an unknown sequence number.
    pub fn clear_investigation(
        &self,
        sequence: u64,
        reason: &str,
        raised_by: ActorId,
    ) -> AuditResult<InvestigationRecord> {
        self.set_investigation(sequence, InvestigationStatus::Cleared, reason, raised_by)
    }

    fn set_investigation(
        &self,
        sequence: u64,
        status: InvestigationStatus,
        reason: &str,
        raised_by: ActorId,
    ) -> AuditResult<InvestigationRecord> {
        if sequence != LEDGER_SEQUENCE && sequence > self.count()? {
            return Err(AuditError::EntryNotFound { sequence });
        }
        let record = InvestigationRecord::new(sequence, status, reason, raised_by);
        self.storage.append_investigation(&record)?;
        info!(sequence, %status, raised_by = %record.raised_by, "Investigation status changed");
        Ok(record)
    }

    /// Investigation history of one sequence number, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn investigations(&self, sequence: u64) -> AuditResult<Vec<InvestigationRecord>> {
        self.storage.investigations(sequence)
    }

    /// Current investigation status of one sequence number.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn investigation_status(&self, sequence: u64) -> AuditResult<Option<InvestigationStatus>> {
        Ok(current_status(&self.investigations(sequence)?))
    }

    /// Whether the ledger as a whole has an open investigation.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn is_under_investigation(&self) -> AuditResult<bool> {
        Ok(self
            .investigation_status(LEDGER_SEQUENCE)?
            .is_some_and(|s| s.is_open()))
    }

    /// Scoring configuration in effect.
    #[must_use]
    pub fn scoring(&self) -> &ScoringConfig {
        &self.scoring
    }

    /// Behavioral baselines.
    #[must_use]
    pub fn baselines(&self) -> &Arc<BaselineStore> {
        &self.baselines
    }

    /// Flush storage.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn close(&self) -> AuditResult<()> {
        self.storage.flush()?;
        info!(head = self.count()?, "Audit ledger closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::{ChannelNotifier, TracingNotifier};
    use crate::storage::{KvAuditStorage, StoredEntry};
    use crate::threat::ThreatIndicator;
    use chrono::{TimeZone, Utc};
    use custos_core::{DataClassification, EventCategory};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn actor(id: &str) -> ActorId {
        ActorId::new(id).unwrap()
    }

    fn at_hour(hour: u32) -> Timestamp {
        Timestamp::from_datetime(Utc.with_ymd_and_hms(2026, 4, 14, hour, 0, 0).unwrap())
    }

    fn ledger_over(storage: Arc<dyn AuditStorage>, key: SigningKey) -> AuditLedger {
        AuditLedger::open(
            storage,
            key,
            Arc::new(BaselineStore::in_memory()),
            Arc::new(TracingNotifier),
            LedgerSettings::default(),
        )
        .unwrap()
    }

    fn ledger() -> AuditLedger {
        ledger_over(
            Arc::new(KvAuditStorage::in_memory().unwrap()),
            SigningKey::generate(),
        )
    }

    fn daytime(actor_id: &str, action: &str) -> AuditEvent {
        AuditEvent::new(actor(actor_id), action).occurred_at(at_hour(10))
    }

    /// Storage whose entry writes can be made to fail.
    struct FlakyStorage {
        inner: KvAuditStorage,
        fail_writes: AtomicBool,
    }

    impl AuditStorage for FlakyStorage {
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

    #[test]
    fn test_append_links_entries() {
        let ledger = ledger();
        let first = ledger.append(daytime("ann", "login")).unwrap();
        let second = ledger.append(daytime("ann", "view_client")).unwrap();

        assert_eq!(first.sequence_number, 1);
        assert!(first.previous_hash.is_zero());
        assert!(second.follows(&first));
        assert_eq!(ledger.count().unwrap(), 2);
        assert_eq!(ledger.head().unwrap().unwrap(), second);
        assert_eq!(ledger.get(1).unwrap(), first);
        assert!(matches!(
            ledger.get(3),
            Err(AuditError::EntryNotFound { sequence: 3 })
        ));
    }

    #[test]
    fn test_concurrent_appends_are_gapless() {
        let ledger = Arc::new(ledger());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    (0..25)
                        .map(|i| {
                            ledger
                                .append(daytime(&format!("worker-{t}"), &format!("op-{i}")))
                                .unwrap()
                                .sequence_number
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut seqs: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        seqs.sort_unstable();
        assert_eq!(seqs, (1..=200).collect::<Vec<_>>());
        assert!(ledger.verify_range(1, 200).unwrap().is_valid);
    }

    #[test]
    fn test_failed_write_consumes_no_sequence() {
        let storage = Arc::new(FlakyStorage {
            inner: KvAuditStorage::in_memory().unwrap(),
            fail_writes: AtomicBool::new(false),
        });
        let ledger = ledger_over(storage.clone(), SigningKey::generate());
        let first = ledger.append(daytime("ann", "login")).unwrap();

        storage.fail_writes.store(true, Ordering::SeqCst);
        assert!(matches!(
            ledger.append(daytime("ann", "logout")),
            Err(AuditError::PersistenceFailure(_))
        ));
        assert_eq!(ledger.count().unwrap(), 1);

        storage.fail_writes.store(false, Ordering::SeqCst);
        let next = ledger.append(daytime("ann", "logout")).unwrap();
        assert_eq!(next.sequence_number, 2);
        assert!(next.follows(&first));
    }

    #[test]
    fn test_reopen_recovers_head() {
        let storage: Arc<dyn AuditStorage> = Arc::new(KvAuditStorage::in_memory().unwrap());
        let key = SigningKey::generate();
        let last = {
            let ledger = ledger_over(Arc::clone(&storage), key.clone());
            ledger.append(daytime("ann", "a")).unwrap();
            ledger.append(daytime("ann", "b")).unwrap()
        };
        // Simulate a lost pointer update.
        storage.set_head(1).unwrap();

        let reopened = ledger_over(Arc::clone(&storage), key);
        assert_eq!(reopened.count().unwrap(), 2);
        let next = reopened.append(daytime("ann", "c")).unwrap();
        assert!(next.follows(&last));
        assert_eq!(storage.head().unwrap(), Some(3));
    }

    #[test]
    fn test_missing_head_entry_refuses_open() {
        let storage: Arc<dyn AuditStorage> = Arc::new(KvAuditStorage::in_memory().unwrap());
        storage.set_head(7).unwrap();
        let err = AuditLedger::open(
            storage,
            SigningKey::generate(),
            Arc::new(BaselineStore::in_memory()),
            Arc::new(TracingNotifier),
            LedgerSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AuditError::ChainIntegrityViolation { sequence: 7, .. }
        ));
    }

    #[test]
    fn test_alert_and_suspicious_record() {
        let (notifier, mut rx) = ChannelNotifier::new();
        let ledger = AuditLedger::open(
            Arc::new(KvAuditStorage::in_memory().unwrap()),
            SigningKey::generate(),
            Arc::new(BaselineStore::in_memory()),
            Arc::new(notifier),
            LedgerSettings::default(),
        )
        .unwrap();

        let quiet = ledger.append(daytime("ann", "login")).unwrap();
        assert!(rx.try_recv().is_err());
        assert!(ledger.investigations(quiet.sequence_number).unwrap().is_empty());

        let loud = ledger
            .append(
                AuditEvent::new(actor("ann"), "view_session_notes")
                    .occurred_at(at_hour(3))
                    .category(EventCategory::DataAccess)
                    .classification(DataClassification::Restricted)
                    .phi(true),
            )
            .unwrap();
        assert!(loud.threat_indicators.contains(&ThreatIndicator::OffHoursPhiAccess { hour: 3 }));
        let alert = rx.try_recv().unwrap();
        assert_eq!(alert.sequence_number, loud.sequence_number);
        assert_eq!(
            ledger.investigation_status(loud.sequence_number).unwrap(),
            Some(InvestigationStatus::Suspicious)
        );
    }

    #[test]
    fn test_dropped_notifier_does_not_fail_append() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        let ledger = AuditLedger::open(
            Arc::new(KvAuditStorage::in_memory().unwrap()),
            SigningKey::generate(),
            Arc::new(BaselineStore::in_memory()),
            Arc::new(notifier),
            LedgerSettings::default(),
        )
        .unwrap();
        let entry = ledger
            .append(AuditEvent::new(actor("eve"), "grant_role").occurred_at(at_hour(11)))
            .unwrap();
        assert_eq!(entry.sequence_number, 1);
    }

    #[test]
    fn test_off_hours_login_is_high_anomaly() {
        let ledger = ledger();
        for _ in 0..3 {
            ledger.append(daytime("coach", "login")).unwrap();
        }
        let night = ledger
            .append(
                AuditEvent::new(actor("coach"), "login")
                    .category(EventCategory::Authentication)
                    .occurred_at(at_hour(3)),
            )
            .unwrap();
        assert!(night.anomaly_score >= 25);
        let high = ledger.high_anomaly_entries(10).unwrap();
        assert_eq!(high.first().map(|e| e.sequence_number), Some(night.sequence_number));
    }

    #[test]
    fn test_baseline_updated_on_append() {
        let ledger = ledger();
        ledger
            .append(daytime("ann", "login").ip_address("10.1.1.1"))
            .unwrap();
        let baseline = ledger.baselines().get(&actor("ann")).unwrap().unwrap();
        assert_eq!(baseline.event_count, 1);
        assert!(baseline.knows_origin("10.1.1.1"));

        let again = ledger
            .append(daytime("ann", "login").ip_address("10.9.9.9"))
            .unwrap();
        assert_eq!(again.anomaly_score, 25);
    }

    #[test]
    fn test_query_filters_and_orders() {
        let ledger = ledger();
        for i in 0..6 {
            let who = if i % 2 == 0 { "ann" } else { "bob" };
            ledger.append(daytime(who, "login")).unwrap();
        }
        let page = ledger
            .query(&AuditFilter::new().actor(actor("bob")).newest_first().page(0, 2))
            .unwrap();
        assert_eq!(page.total_matching, 3);
        assert!(page.has_more);
        assert_eq!(
            page.entries.iter().map(|e| e.sequence_number).collect::<Vec<_>>(),
            vec![6, 4]
        );

        let window = ledger.query(&AuditFilter::new().sequences(2, 3)).unwrap();
        assert_eq!(window.total_matching, 2);
    }

    #[test]
    fn test_verify_failure_flags_ledger() {
        let storage = Arc::new(KvAuditStorage::in_memory().unwrap());
        let ledger = ledger_over(storage.clone(), SigningKey::generate());
        for i in 0..3 {
            ledger.append(daytime("ann", &format!("op-{i}"))).unwrap();
        }
        assert!(!ledger.is_under_investigation().unwrap());

        let mut entry = ledger.get(2).unwrap();
        entry.risk_score = 0;
        custos_storage::BlockingKvStore::new(storage.kv().clone(), crate::storage::ENTRY_NAMESPACE)
            .unwrap()
            .set_json(&crate::storage::entry_key(2), &entry)
            .unwrap();

        let report = ledger.verify_range(1, 3).unwrap();
        assert_eq!(report.broken_chain_at, Some(2));
        assert!(ledger.is_under_investigation().unwrap());

        ledger
            .clear_investigation(LEDGER_SEQUENCE, "restored from backup", actor("officer"))
            .unwrap();
        assert!(!ledger.is_under_investigation().unwrap());
    }

    #[test]
    fn test_flag_unknown_entry() {
        let ledger = ledger();
        assert!(matches!(
            ledger.flag_for_investigation(5, "why", actor("officer")),
            Err(AuditError::EntryNotFound { sequence: 5 })
        ));
        ledger.append(daytime("ann", "login")).unwrap();
        let record = ledger
            .flag_for_investigation(1, "odd login", actor("officer"))
            .unwrap();
        assert_eq!(record.status, InvestigationStatus::UnderInvestigation);
        assert_eq!(ledger.investigations(1).unwrap().len(), 1);
    }
}
