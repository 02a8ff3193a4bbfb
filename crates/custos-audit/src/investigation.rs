//! Investigation side table.
//!
//! Investigation status is kept apart from the entries: records are
//! append-only, keyed by sequence number, and never hashed or signed, so
//! flagging an entry never disturbs the chain. Sequence number 0 refers to
//! the ledger as a whole (raised when verification fails).

use std::fmt;

use custos_core::{ActorId, Timestamp};
use serde::{Deserialize, Serialize};

/// Sequence number used for records about the whole ledger.
pub const LEDGER_SEQUENCE: u64 = 0;

/// Investigation state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationStatus {
    /// Raised automatically by an alert.
    Suspicious,
    /// Under active review.
    UnderInvestigation,
    /// Reviewed and closed.
    Cleared,
}

impl InvestigationStatus {
    /// Whether the entry still needs attention.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        !matches!(self, Self::Cleared)
    }
}

impl fmt::Display for InvestigationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Suspicious => "suspicious",
            Self::UnderInvestigation => "under_investigation",
            Self::Cleared => "cleared",
        })
    }
}

/// One status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigationRecord {
    /// Entry concerned ([`LEDGER_SEQUENCE`] for the whole ledger).
    pub sequence_number: u64,
    /// New status.
    pub status: InvestigationStatus,
    /// Why.
    pub reason: String,
    /// Who raised it.
    pub raised_by: ActorId,
    /// When.
    pub raised_at: Timestamp,
}

impl InvestigationRecord {
    /// A record raised now.
    #[must_use]
    pub fn new(
        sequence_number: u64,
        status: InvestigationStatus,
        reason: impl Into<String>,
        raised_by: ActorId,
    ) -> Self {
        Self {
            sequence_number,
            status,
            reason: reason.into(),
            raised_by,
            raised_at: Timestamp::now(),
        }
    }

    /// Storage key: sorts by sequence, then time, unique per record.
    pub(crate) fn storage_key(&self) -> String {
        let nanos = self.raised_at.0.timestamp_nanos_opt().unwrap_or_default();
        format!(
            "{}:{nanos:020}:{}",
            sequence_prefix(self.sequence_number),
            uuid::Uuid::new_v4().simple()
        )
    }
}

/// Key prefix shared by all records of one sequence number.
pub(crate) fn sequence_prefix(sequence: u64) -> String {
    format!("{sequence:020}")
}

/// The current status from a sequence's records (latest wins).
#[must_use]
pub fn current_status(records: &[InvestigationRecord]) -> Option<InvestigationStatus> {
    records.iter().max_by_key(|r| r.raised_at).map(|r| r.status)
}
