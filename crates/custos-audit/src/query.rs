//! Read-only filtered retrieval.

use custos_core::{ActorId, DataClassification, EventCategory, Timestamp};
use serde::{Deserialize, Serialize};

use crate::entry::AuditEntry;

/// Default page size.
pub const DEFAULT_LIMIT: usize = 100;

/// Criteria for [`AuditLedger::query`](crate::AuditLedger::query).
///
/// Every criterion that is set must match. The time window applies to
/// `occurred_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditFilter {
    /// Only this actor.
    pub actor: Option<ActorId>,
    /// Only this action.
    pub action: Option<String>,
    /// Only this category.
    pub category: Option<EventCategory>,
    /// Only this classification.
    pub classification: Option<DataClassification>,
    /// Only entries with this PHI flag.
    pub phi: Option<bool>,
    /// Risk score at least this.
    pub min_risk_score: Option<u8>,
    /// Anomaly score at least this.
    pub min_anomaly_score: Option<u8>,
    /// Only entries where a threat rule fired.
    pub threats_only: bool,
    /// Occurred at or after.
    pub since: Option<Timestamp>,
    /// Occurred before.
    pub until: Option<Timestamp>,
    /// First sequence number.
    pub from_sequence: Option<u64>,
    /// Last sequence number.
    pub to_sequence: Option<u64>,
    /// Return newest entries first.
    pub newest_first: bool,
    /// Matches to skip.
    pub offset: usize,
    /// Page size.
    pub limit: usize,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            actor: None,
            action: None,
            category: None,
            classification: None,
            phi: None,
            min_risk_score: None,
            min_anomaly_score: None,
            threats_only: false,
            since: None,
            until: None,
            from_sequence: None,
            to_sequence: None,
            newest_first: false,
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl AuditFilter {
    /// Match everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only `actor`.
    #[must_use]
    pub fn actor(mut self, actor: ActorId) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Only `action`.
    #[must_use]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Only `category`.
    #[must_use]
    pub fn category(mut self, category: EventCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Risk score at least `score`.
    #[must_use]
    pub fn min_risk(mut self, score: u8) -> Self {
        self.min_risk_score = Some(score);
        self
    }

    /// Anomaly score at least `score`.
    #[must_use]
    pub fn min_anomaly(mut self, score: u8) -> Self {
        self.min_anomaly_score = Some(score);
        self
    }

    /// Only PHI (or only non-PHI) entries.
    #[must_use]
    pub fn phi(mut self, phi: bool) -> Self {
        self.phi = Some(phi);
        self
    }

    /// Only entries where a threat rule fired.
    #[must_use]
    pub fn threats_only(mut self) -> Self {
        self.threats_only = true;
        self
    }

    /// Occurred within `[since, until)`.
    #[must_use]
    pub fn between(mut self, since: Timestamp, until: Timestamp) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    /// Sequence numbers `from..=to`.
    #[must_use]
    pub fn sequences(mut self, from: u64, to: u64) -> Self {
        self.from_sequence = Some(from);
        self.to_sequence = Some(to);
        self
    }

    /// Newest first.
    #[must_use]
    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    /// Page window.
    #[must_use]
    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// Whether `entry` satisfies every criterion.
    #[must_use]
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.actor.as_ref().is_none_or(|a| *a == entry.actor)
            && self.action.as_ref().is_none_or(|a| *a == entry.action)
            && self.category.is_none_or(|c| c == entry.category)
            && self
                .classification
                .is_none_or(|c| c == entry.data_classification)
            && self.phi.is_none_or(|p| p == entry.phi)
            && self.min_risk_score.is_none_or(|s| entry.risk_score >= s)
            && self.min_anomaly_score.is_none_or(|s| entry.anomaly_score >= s)
            && (!self.threats_only || !entry.threat_indicators.is_empty())
            && self.since.is_none_or(|t| entry.occurred_at >= t)
            && self.until.is_none_or(|t| entry.occurred_at < t)
            && self
                .from_sequence
                .is_none_or(|s| entry.sequence_number >= s)
            && self.to_sequence.is_none_or(|s| entry.sequence_number <= s)
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPage {
    /// Entries on this page.
    pub entries: Vec<AuditEntry>,
    /// Matches across all pages.
    pub total_matching: usize,
    /// Offset of this page.
    pub offset: usize,
    /// Requested page size.
    pub limit: usize,
    /// Whether another page follows.
    pub has_more: bool,
}

impl QueryPage {
    /// Page `matching` (already filtered and ordered) per `filter`.
    pub(crate) fn paginate(matching: Vec<AuditEntry>, filter: &AuditFilter) -> Self {
        let total_matching = matching.len();
        let entries: Vec<AuditEntry> = matching
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect();
        let shown = filter.offset.saturating_add(entries.len());
        Self {
            entries,
            total_matching,
            offset: filter.offset,
            limit: filter.limit,
            has_more: shown < total_matching,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custos_crypto::SigningKey;

    fn entries(n: u64) -> Vec<AuditEntry> {
        let key = SigningKey::generate();
        (1..=n)
            .map(|i| {
                let mut e = AuditEntry::sample(&key, "ann", "login", Timestamp::now());
                e.sequence_number = i;
                e
            })
            .collect()
    }

    #[test]
    fn test_pagination() {
        let filter = AuditFilter::new().page(2, 2);
        let page = QueryPage::paginate(entries(5), &filter);
        assert_eq!(page.total_matching, 5);
        assert_eq!(
            page.entries.iter().map(|e| e.sequence_number).collect::<Vec<_>>(),
            vec![3, 4]
        );
        assert!(page.has_more);

        let last = QueryPage::paginate(entries(5), &AuditFilter::new().page(4, 2));
        assert_eq!(last.entries.len(), 1);
        assert!(!last.has_more);
    }

    #[test]
    fn test_filter_criteria() {
        let mut e = entries(1).remove(0);
        e.risk_score = 40;
        e.phi = true;
        assert!(AuditFilter::new().min_risk(40).phi(true).matches(&e));
        assert!(!AuditFilter::new().min_risk(41).matches(&e));
        assert!(!AuditFilter::new().threats_only().matches(&e));
        assert!(!AuditFilter::new().action("logout").matches(&e));
        assert!(AuditFilter::new().actor(ActorId::new("ann").unwrap()).matches(&e));
        assert!(!AuditFilter::new().sequences(2, 9).matches(&e));
    }
}
