//! Chain verification.
//!
//! The verifier trusts nothing but the stored bytes: each entry's hash is
//! re-derived from its stored fields, its `previous_hash` is compared with
//! the *stored* hash of its predecessor, and its signature is re-checked
//! when a key is available. Nothing is ever repaired.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use custos_crypto::{ContentHash, SigningKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{AuditError, AuditResult};
use crate::storage::AuditStorage;

/// A problem found while verifying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainIssue {
    /// No entry is stored under this sequence number.
    Missing {
        /// Sequence number.
        sequence: u64,
    },
    /// The stored bytes do not decode.
    Unreadable {
        /// Sequence number.
        sequence: u64,
        /// Decoder message.
        error: String,
    },
    /// The entry stored under this key carries another sequence number.
    OutOfOrder {
        /// Storage position.
        sequence: u64,
        /// Sequence number inside the entry.
        found: u64,
    },
    /// The stored fields no longer produce the stored hash.
    HashMismatch {
        /// Sequence number.
        sequence: u64,
    },
    /// `previous_hash` differs from the predecessor's stored hash.
    BrokenLink {
        /// Sequence number.
        sequence: u64,
    },
    /// The signature does not verify.
    InvalidSignature {
        /// Sequence number.
        sequence: u64,
    },
}

impl ChainIssue {
    /// Sequence number the issue is about.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        match self {
            Self::Missing { sequence }
            | Self::Unreadable { sequence, .. }
            | Self::OutOfOrder { sequence, .. }
            | Self::HashMismatch { sequence }
            | Self::BrokenLink { sequence }
            | Self::InvalidSignature { sequence } => *sequence,
        }
    }
}

impl fmt::Display for ChainIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { sequence } => write!(f, "entry {sequence} is missing"),
            Self::Unreadable { sequence, error } => {
                write!(f, "entry {sequence} is unreadable: {error}")
            },
            Self::OutOfOrder { sequence, found } => {
                write!(f, "position {sequence} holds entry {found}")
            },
            Self::HashMismatch { sequence } => {
                write!(f, "entry {sequence} does not match its integrity hash")
            },
            Self::BrokenLink { sequence } => {
                write!(f, "entry {sequence} does not link to its predecessor")
            },
            Self::InvalidSignature { sequence } => {
                write!(f, "entry {sequence} has an invalid signature")
            },
        }
    }
}

/// Outcome of a verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerificationReport {
    /// First sequence number checked.
    pub from: u64,
    /// Last sequence number checked.
    pub to: u64,
    /// Whether no issues were found.
    pub is_valid: bool,
    /// Entries decoded and checked.
    pub entries_verified: u64,
    /// Everything found, in sequence order.
    pub issues: Vec<ChainIssue>,
    /// Earliest sequence number with an issue.
    pub broken_chain_at: Option<u64>,
    /// Signatures verified.
    pub signatures_checked: u64,
}

impl ChainVerificationReport {
    /// Convert an invalid report into an error.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::ChainIntegrityViolation`] at `broken_chain_at`.
    pub fn into_result(self) -> AuditResult<Self> {
        match (self.is_valid, self.issues.first()) {
            (false, Some(first)) => Err(AuditError::ChainIntegrityViolation {
                sequence: self.broken_chain_at.unwrap_or_else(|| first.sequence()),
                reason: first.to_string(),
            }),
            _ => Ok(self),
        }
    }
}

/// Re-derives the hash chain over a range of stored entries.
#[derive(Clone)]
pub struct IntegrityVerifier {
    storage: Arc<dyn AuditStorage>,
    signing_key: Option<SigningKey>,
}

impl fmt::Debug for IntegrityVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrityVerifier")
            .field("checks_signatures", &self.signing_key.is_some())
            .finish_non_exhaustive()
    }
}

impl IntegrityVerifier {
    /// Verify hashes and links only.
    #[must_use]
    pub fn new(storage: Arc<dyn AuditStorage>) -> Self {
        Self {
            storage,
            signing_key: None,
        }
    }

    /// Also verify signatures with `key`.
    #[must_use]
    pub fn with_signing_key(mut self, key: SigningKey) -> Self {
        self.signing_key = Some(key);
        self
    }

    /// Verify entries `from..=to`.
    ///
    /// `to` is clamped to the last known entry. Sequence numbers below 1
    /// are treated as 1.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend cannot be read. Tampering is
    /// reported in the returned report, not as an error.
    pub fn verify_range(&self, from: u64, to: u64) -> AuditResult<ChainVerificationReport> {
        let from = from.max(1);
        let scanned = self.storage.scan(from, to)?;
        let last_stored = scanned.last().map_or(0, |s| s.key_sequence);
        let head = self.storage.head()?.unwrap_or(0);
        let to = to.min(last_stored.max(head));

        let mut report = ChainVerificationReport {
            from,
            to,
            is_valid: true,
            entries_verified: 0,
            issues: Vec::new(),
            broken_chain_at: None,
            signatures_checked: 0,
        };
        if from > to {
            return Ok(report);
        }

        // Expected previous hash; `None` once the predecessor is unknown.
        let mut previous: Option<ContentHash> = match from.checked_sub(1) {
            Some(0) | None => Some(ContentHash::zero()),
            Some(prev) => self
                .storage
                .get_entry(prev)
                .ok()
                .flatten()
                .map(|e| e.integrity_hash),
        };

        let mut stored: BTreeMap<u64, _> =
            scanned.into_iter().map(|s| (s.key_sequence, s.entry)).collect();

        for sequence in from..=to {
            let entry = match stored.remove(&sequence) {
                None => {
                    report.issues.push(ChainIssue::Missing { sequence });
                    previous = None;
                    continue;
                },
                Some(Err(error)) => {
                    report.issues.push(ChainIssue::Unreadable { sequence, error });
                    previous = None;
                    continue;
                },
                Some(Ok(entry)) => entry,
            };
            report.entries_verified = report.entries_verified.saturating_add(1);

            if entry.sequence_number != sequence {
                report.issues.push(ChainIssue::OutOfOrder {
                    sequence,
                    found: entry.sequence_number,
                });
            }
            if let Some(expected) = previous
                && entry.previous_hash != expected
            {
                report.issues.push(ChainIssue::BrokenLink { sequence });
            }
            match entry.compute_hash() {
                Ok(hash) if hash == entry.integrity_hash => {},
                _ => report.issues.push(ChainIssue::HashMismatch { sequence }),
            }
            if let Some(key) = &self.signing_key {
                report.signatures_checked = report.signatures_checked.saturating_add(1);
                if entry.verify_signature(key).is_err() {
                    report.issues.push(ChainIssue::InvalidSignature { sequence });
                }
            }

            previous = Some(entry.integrity_hash);
        }

        report.broken_chain_at = report.issues.iter().map(ChainIssue::sequence).min();
        report.is_valid = report.issues.is_empty();
        if report.is_valid {
            debug!(from, to, entries = report.entries_verified, "Audit chain verified");
        } else {
            error!(
                from,
                to,
                broken_chain_at = ?report.broken_chain_at,
                issues = report.issues.len(),
                "Audit chain integrity violation"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{AuditEntry, AuditEvent, Scores};
    use crate::storage::{ENTRY_NAMESPACE, KvAuditStorage, entry_key};
    use custos_core::{ActorId, RiskLevel, Timestamp};
    use custos_storage::BlockingKvStore;

    fn chain(n: u64) -> (Arc<KvAuditStorage>, SigningKey) {
        let storage = Arc::new(KvAuditStorage::in_memory().unwrap());
        let key = SigningKey::generate();
        let mut previous = ContentHash::zero();
        for seq in 1..=n {
            let event = AuditEvent::new(ActorId::new("ann").unwrap(), format!("action-{seq}"));
            let scores = Scores {
                anomaly_score: 0,
                risk_score: 5,
                risk_level: RiskLevel::Low,
                threat_indicators: Vec::new(),
            };
            let entry =
                AuditEntry::seal(event, seq, Timestamp::now(), scores, previous, &key).unwrap();
            previous = entry.integrity_hash;
            storage.put_entry(&entry).unwrap();
            storage.set_head(seq).unwrap();
        }
        (storage, key)
    }

    fn raw(storage: &KvAuditStorage) -> BlockingKvStore {
        BlockingKvStore::new(storage.kv().clone(), ENTRY_NAMESPACE).unwrap()
    }

    fn overwrite(storage: &KvAuditStorage, entry: &AuditEntry) {
        raw(storage)
            .set_json(&entry_key(entry.sequence_number), entry)
            .unwrap();
    }

    fn verifier(storage: &Arc<KvAuditStorage>, key: &SigningKey) -> IntegrityVerifier {
        IntegrityVerifier::new(storage.clone()).with_signing_key(key.clone())
    }

    #[test]
    fn test_intact_chain() {
        let (storage, key) = chain(5);
        let report = verifier(&storage, &key).verify_range(1, u64::MAX).unwrap();
        assert!(report.is_valid);
        assert_eq!(report.entries_verified, 5);
        assert_eq!(report.signatures_checked, 5);
        assert_eq!(report.to, 5);
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_field_tamper_flags_that_entry() {
        let (storage, key) = chain(5);
        let mut entry = storage.get_entry(3).unwrap().unwrap();
        entry.actor = ActorId::new("someone-else").unwrap();
        overwrite(&storage, &entry);

        let report = verifier(&storage, &key).verify_range(1, 5).unwrap();
        assert!(!report.is_valid);
        assert_eq!(report.broken_chain_at, Some(3));
        assert_eq!(report.issues, vec![ChainIssue::HashMismatch { sequence: 3 }]);
    }

    #[test]
    fn test_rehashed_tamper_breaks_link_and_signature() {
        let (storage, key) = chain(4);
        let mut entry = storage.get_entry(2).unwrap().unwrap();
        entry.action = "covered_up".into();
        entry.integrity_hash = entry.compute_hash().unwrap();
        overwrite(&storage, &entry);

        let report = verifier(&storage, &key).verify_range(1, 4).unwrap();
        assert_eq!(report.broken_chain_at, Some(2));
        assert!(report.issues.contains(&ChainIssue::InvalidSignature { sequence: 2 }));
        assert!(report.issues.contains(&ChainIssue::BrokenLink { sequence: 3 }));

        // Without the key only the link break is visible.
        let unsigned = IntegrityVerifier::new(storage.clone()).verify_range(1, 4).unwrap();
        assert_eq!(unsigned.issues, vec![ChainIssue::BrokenLink { sequence: 3 }]);
        assert_eq!(unsigned.signatures_checked, 0);
    }

    #[test]
    fn test_deleted_entry_is_missing() {
        let (storage, key) = chain(5);
        raw(&storage).delete(&entry_key(4)).unwrap();
        let report = verifier(&storage, &key).verify_range(1, 5).unwrap();
        assert_eq!(report.issues, vec![ChainIssue::Missing { sequence: 4 }]);
        assert_eq!(report.broken_chain_at, Some(4));
    }

    #[test]
    fn test_deleted_tail_detected_from_head_pointer() {
        let (storage, key) = chain(5);
        raw(&storage).delete(&entry_key(5)).unwrap();
        let report = verifier(&storage, &key).verify_range(1, u64::MAX).unwrap();
        assert_eq!(report.issues, vec![ChainIssue::Missing { sequence: 5 }]);
    }

    #[test]
    fn test_swapped_entries_out_of_order() {
        let (storage, key) = chain(3);
        let two = storage.get_entry(2).unwrap().unwrap();
        let three = storage.get_entry(3).unwrap().unwrap();
        let r = raw(&storage);
        r.set_json(&entry_key(2), &three).unwrap();
        r.set_json(&entry_key(3), &two).unwrap();

        let report = verifier(&storage, &key).verify_range(1, 3).unwrap();
        assert_eq!(report.broken_chain_at, Some(2));
        assert!(report.issues.contains(&ChainIssue::OutOfOrder { sequence: 2, found: 3 }));
    }

    #[test]
    fn test_forged_signature() {
        let (storage, key) = chain(2);
        let mut entry = storage.get_entry(1).unwrap().unwrap();
        entry.digital_signature = SigningKey::generate().sign(entry.integrity_hash.as_bytes());
        overwrite(&storage, &entry);
        let report = verifier(&storage, &key).verify_range(1, 2).unwrap();
        assert_eq!(report.issues, vec![ChainIssue::InvalidSignature { sequence: 1 }]);
    }

    #[test]
    fn test_partial_range_links_to_stored_predecessor() {
        let (storage, key) = chain(6);
        let report = verifier(&storage, &key).verify_range(4, 6).unwrap();
        assert!(report.is_valid);
        assert_eq!(report.entries_verified, 3);
    }

    #[test]
    fn test_into_result_reports_violation() {
        let (storage, key) = chain(3);
        raw(&storage).set(&entry_key(2), b"garbage".to_vec()).unwrap();
        let err = verifier(&storage, &key)
            .verify_range(1, 3)
            .unwrap()
            .into_result()
            .unwrap_err();
        assert!(matches!(
            err,
            AuditError::ChainIntegrityViolation { sequence: 2, .. }
        ));
    }

    #[test]
    fn test_empty_ledger_is_valid() {
        let storage = Arc::new(KvAuditStorage::in_memory().unwrap());
        let report = IntegrityVerifier::new(storage).verify_range(1, 100).unwrap();
        assert!(report.is_valid);
        assert_eq!(report.entries_verified, 0);
    }
}
