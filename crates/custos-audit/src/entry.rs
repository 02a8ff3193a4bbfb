//! Audit events and ledger entries.
//!
//! Collaborators describe what happened with an [`AuditEvent`]. The ledger
//! scores it, assigns the next sequence number, links it to its predecessor
//! and signs it, producing an immutable [`AuditEntry`].
//!
//! # Integrity hash
//!
//! ```text
//! integrity_hash = BLAKE3-derive-key("custos audit entry v1",
//!                      canonical_json(fields) || sequence_number (LE) || previous_hash)
//! digital_signature = HMAC-SHA256(signing_key, integrity_hash)
//! ```
//!
//! `fields` is every entry field except `sequence_number`, `previous_hash`
//! (both bound separately), `integrity_hash` and `digital_signature`.
//! Canonical JSON sorts object keys at every depth, so the hash does not
//! depend on map ordering anywhere in the serialization stack.

use std::collections::BTreeMap;

use custos_core::{ActorId, DataClassification, EventCategory, Outcome, RiskLevel, Timestamp};
use custos_crypto::{ContentHash, MacTag, SigningKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AuditError, AuditResult};
use crate::threat::ThreatIndicator;

/// Domain separation context for entry hashes.
const ENTRY_HASH_DOMAIN: &str = "custos audit entry v1";

/// A changed field in a data modification event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Field name.
    pub field: String,
    /// Value before the change.
    pub old: Option<Value>,
    /// Value after the change.
    pub new: Option<Value>,
}

impl FieldChange {
    /// Describe one changed field.
    #[must_use]
    pub fn new(field: impl Into<String>, old: Option<Value>, new: Option<Value>) -> Self {
        Self {
            field: field.into(),
            old,
            new,
        }
    }
}

/// A security-relevant action reported by a collaborator.
///
/// Built fluently:
///
/// ```
/// use custos_audit::AuditEvent;
/// use custos_core::{ActorId, DataClassification, EventCategory};
///
/// let event = AuditEvent::new(ActorId::new("coach-17").unwrap(), "view_session_notes")
///     .resource("session", "s-42")
///     .category(EventCategory::DataAccess)
///     .classification(DataClassification::Restricted)
///     .phi(true)
///     .ip_address("203.0.113.9");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Who acted.
    pub actor: ActorId,
    /// What they did (`login`, `export_clients`, `rotate_key`).
    pub action: String,
    /// Resource type.
    pub resource: Option<String>,
    /// Resource identifier.
    pub resource_id: Option<String>,
    /// Human-readable description.
    pub description: Option<String>,
    /// Network origin.
    pub ip_address: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
    /// Caller's own risk assessment.
    pub risk_hint: Option<RiskLevel>,
    /// Event category.
    pub category: EventCategory,
    /// Sensitivity of the data touched.
    pub data_classification: DataClassification,
    /// Whether protected health information was touched.
    pub phi: bool,
    /// Outcome.
    pub outcome: Outcome,
    /// Field-level diff for modifications.
    pub changes: Vec<FieldChange>,
    /// Number of records affected (exports, bulk updates).
    pub record_count: Option<u64>,
    /// When the action happened; defaults to append time.
    pub occurred_at: Option<Timestamp>,
    /// Additional structured context.
    pub metadata: BTreeMap<String, Value>,
}

impl AuditEvent {
    /// Start an event for `actor` performing `action`.
    #[must_use]
    pub fn new(actor: ActorId, action: impl Into<String>) -> Self {
        Self {
            actor,
            action: action.into(),
            resource: None,
            resource_id: None,
            description: None,
            ip_address: None,
            user_agent: None,
            risk_hint: None,
            category: EventCategory::default(),
            data_classification: DataClassification::default(),
            phi: false,
            outcome: Outcome::Success,
            changes: Vec::new(),
            record_count: None,
            occurred_at: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Resource type and identifier.
    #[must_use]
    pub fn resource(mut self, kind: impl Into<String>, id: impl Into<String>) -> Self {
        self.resource = Some(kind.into());
        self.resource_id = Some(id.into());
        self
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Network origin.
    #[must_use]
    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    /// Client user agent.
    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Caller's risk assessment; the entry's level is never lower.
    #[must_use]
    pub fn risk_hint(mut self, level: RiskLevel) -> Self {
        self.risk_hint = Some(level);
        self
    }

    /// Event category.
    #[must_use]
    pub fn category(mut self, category: EventCategory) -> Self {
        self.category = category;
        self
    }

    /// Data classification.
    #[must_use]
    pub fn classification(mut self, classification: DataClassification) -> Self {
        self.data_classification = classification;
        self
    }

    /// Mark PHI access.
    #[must_use]
    pub fn phi(mut self, phi: bool) -> Self {
        self.phi = phi;
        self
    }

    /// Outcome.
    #[must_use]
    pub fn outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Shorthand for `outcome(Outcome::Failure)`.
    #[must_use]
    pub fn failed(self) -> Self {
        self.outcome(Outcome::Failure)
    }

    /// Add one changed field.
    #[must_use]
    pub fn change(mut self, change: FieldChange) -> Self {
        self.changes.push(change);
        self
    }

    /// Number of records affected.
    #[must_use]
    pub fn record_count(mut self, count: u64) -> Self {
        self.record_count = Some(count);
        self
    }

    /// When the action happened, if not now.
    #[must_use]
    pub fn occurred_at(mut self, at: Timestamp) -> Self {
        self.occurred_at = Some(at);
        self
    }

    /// Attach structured context.
    #[must_use]
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Scores assigned to an event before it is sealed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Scores {
    pub(crate) anomaly_score: u8,
    pub(crate) risk_score: u8,
    pub(crate) risk_level: RiskLevel,
    pub(crate) threat_indicators: Vec<ThreatIndicator>,
}

/// An immutable, sealed ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the ledger, starting at 1.
    pub sequence_number: u64,
    /// When the ledger appended the entry.
    pub timestamp: Timestamp,
    /// When the action happened.
    pub occurred_at: Timestamp,
    /// Who acted.
    pub actor: ActorId,
    /// What they did.
    pub action: String,
    /// Resource type.
    pub resource: Option<String>,
    /// Resource identifier.
    pub resource_id: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Network origin.
    pub ip_address: Option<String>,
    /// User agent.
    pub user_agent: Option<String>,
    /// Final risk level.
    pub risk_level: RiskLevel,
    /// Category.
    pub category: EventCategory,
    /// Data classification.
    pub data_classification: DataClassification,
    /// PHI flag.
    pub phi: bool,
    /// Outcome.
    pub outcome: Outcome,
    /// Field diff.
    pub changes: Vec<FieldChange>,
    /// Records affected.
    pub record_count: Option<u64>,
    /// Structured context.
    pub metadata: BTreeMap<String, Value>,
    /// Deviation from the actor's baseline (0-100).
    pub anomaly_score: u8,
    /// Overall risk (0-100).
    pub risk_score: u8,
    /// Threat rules that fired.
    pub threat_indicators: Vec<ThreatIndicator>,
    /// Hash of this entry's fields, sequence and predecessor link.
    pub integrity_hash: ContentHash,
    /// Integrity hash of the previous entry (zero for the first).
    pub previous_hash: ContentHash,
    /// HMAC over `integrity_hash`.
    pub digital_signature: MacTag,
}

/// The hashed subset of an entry.
#[derive(Serialize)]
struct HashedFields<'a> {
    timestamp: &'a Timestamp,
    occurred_at: &'a Timestamp,
    actor: &'a ActorId,
    action: &'a str,
    resource: &'a Option<String>,
    resource_id: &'a Option<String>,
    description: &'a Option<String>,
    ip_address: &'a Option<String>,
    user_agent: &'a Option<String>,
    risk_level: &'a RiskLevel,
    category: &'a EventCategory,
    data_classification: &'a DataClassification,
    phi: bool,
    outcome: &'a Outcome,
    changes: &'a [FieldChange],
    record_count: &'a Option<u64>,
    metadata: &'a BTreeMap<String, Value>,
    anomaly_score: u8,
    risk_score: u8,
    threat_indicators: &'a [ThreatIndicator],
}

impl AuditEntry {
    /// Build and seal an entry.
    pub(crate) fn seal(
        event: AuditEvent,
        sequence_number: u64,
        timestamp: Timestamp,
        scores: Scores,
        previous_hash: ContentHash,
        signing_key: &SigningKey,
    ) -> AuditResult<Self> {
        let mut entry = Self {
            sequence_number,
            timestamp,
            occurred_at: event.occurred_at.unwrap_or(timestamp),
            actor: event.actor,
            action: event.action,
            resource: event.resource,
            resource_id: event.resource_id,
            description: event.description,
            ip_address: event.ip_address,
            user_agent: event.user_agent,
            risk_level: scores.risk_level,
            category: event.category,
            data_classification: event.data_classification,
            phi: event.phi,
            outcome: event.outcome,
            changes: event.changes,
            record_count: event.record_count,
            metadata: event.metadata,
            anomaly_score: scores.anomaly_score,
            risk_score: scores.risk_score,
            threat_indicators: scores.threat_indicators,
            integrity_hash: ContentHash::zero(),
            previous_hash,
            digital_signature: MacTag::from_bytes([0u8; 32]),
        };
        entry.integrity_hash = entry.compute_hash()?;
        entry.digital_signature = signing_key.sign(entry.integrity_hash.as_bytes());
        Ok(entry)
    }

    /// Canonical JSON of the hashed fields.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Serialization`] if a field cannot be encoded.
    pub fn canonical_fields(&self) -> AuditResult<String> {
        let fields = HashedFields {
            timestamp: &self.timestamp,
            occurred_at: &self.occurred_at,
            actor: &self.actor,
            action: &self.action,
            resource: &self.resource,
            resource_id: &self.resource_id,
            description: &self.description,
            ip_address: &self.ip_address,
            user_agent: &self.user_agent,
            risk_level: &self.risk_level,
            category: &self.category,
            data_classification: &self.data_classification,
            phi: self.phi,
            outcome: &self.outcome,
            changes: &self.changes,
            record_count: &self.record_count,
            metadata: &self.metadata,
            anomaly_score: self.anomaly_score,
            risk_score: self.risk_score,
            threat_indicators: &self.threat_indicators,
        };
        let value =
            serde_json::to_value(&fields).map_err(|e| AuditError::Serialization(e.to_string()))?;
        let mut out = String::new();
        write_canonical(&value, &mut out)?;
        Ok(out)
    }

    /// Re-derive the integrity hash from the stored fields.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Serialization`] if a field cannot be encoded.
    pub fn compute_hash(&self) -> AuditResult<ContentHash> {
        let canonical = self.canonical_fields()?;
        Ok(ContentHash::hash_parts_with_domain(
            ENTRY_HASH_DOMAIN,
            &[
                canonical.as_bytes(),
                &self.sequence_number.to_le_bytes(),
                self.previous_hash.as_bytes(),
            ],
        ))
    }

    /// Verify the signature over the stored integrity hash.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidSignature`] if it does not verify.
    pub fn verify_signature(&self, key: &SigningKey) -> AuditResult<()> {
        key.verify(self.integrity_hash.as_bytes(), &self.digital_signature)
            .map_err(|_| AuditError::InvalidSignature {
                sequence: self.sequence_number,
            })
    }

    /// Whether this entry links to `previous`.
    #[must_use]
    pub fn follows(&self, previous: &AuditEntry) -> bool {
        self.previous_hash == previous.integrity_hash
            && previous.sequence_number.checked_add(1) == Some(self.sequence_number)
    }
}

#[cfg(test)]
impl AuditEntry {
    /// A sealed first entry for `actor` performing `action` at `at`.
    pub(crate) fn sample(key: &SigningKey, actor: &str, action: &str, at: Timestamp) -> Self {
        let event = AuditEvent::new(ActorId::new(actor).unwrap(), action).occurred_at(at);
        let scores = Scores {
            anomaly_score: 0,
            risk_score: 0,
            risk_level: RiskLevel::Low,
            threat_indicators: Vec::new(),
        };
        Self::seal(event, 1, at, scores, ContentHash::zero(), key).unwrap()
    }
}

/// Serialize `value` with object keys sorted at every depth.
fn write_canonical(value: &Value, out: &mut String) -> AuditResult<()> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&to_json(key)?);
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_canonical(v, out)?;
                }
            }
            out.push('}');
        },
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        },
        scalar => out.push_str(&to_json(scalar)?),
    }
    Ok(())
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> AuditResult<String> {
    serde_json::to_string(value).map_err(|e| AuditError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scores() -> Scores {
        Scores {
            anomaly_score: 0,
            risk_score: 10,
            risk_level: RiskLevel::Low,
            threat_indicators: Vec::new(),
        }
    }

    fn sealed(seq: u64, prev: ContentHash, key: &SigningKey) -> AuditEntry {
        let event = AuditEvent::new(ActorId::new("coach-1").unwrap(), "view_client")
            .resource("client", "c-9")
            .category(EventCategory::DataAccess)
            .meta("fields", json!({"z": 1, "a": [ {"y": 2, "b": 3} ]}));
        AuditEntry::seal(event, seq, Timestamp::now(), scores(), prev, key).unwrap()
    }

    #[test]
    fn test_canonical_sorts_nested_keys() {
        let mut out = String::new();
        write_canonical(&json!({"b": {"d": 1, "c": [ {"f": 1, "e": 2} ]}, "a": "x"}), &mut out)
            .unwrap();
        assert_eq!(out, r#"{"a":"x","b":{"c":[{"e":2,"f":1}],"d":1}}"#);
    }

    #[test]
    fn test_canonical_escapes_strings() {
        let mut out = String::new();
        write_canonical(&json!({"k\"ey": "line\nbreak"}), &mut out).unwrap();
        assert_eq!(out, r#"{"k\"ey":"line\nbreak"}"#);
    }

    #[test]
    fn test_hash_reproducible_and_signed() {
        let key = SigningKey::generate();
        let entry = sealed(1, ContentHash::zero(), &key);
        assert_eq!(entry.compute_hash().unwrap(), entry.integrity_hash);
        assert!(entry.verify_signature(&key).is_ok());
        assert!(entry.verify_signature(&SigningKey::generate()).is_err());
    }

    #[test]
    fn test_hash_survives_json_roundtrip() {
        let key = SigningKey::generate();
        let entry = sealed(3, ContentHash::hash(b"prev"), &key);
        let json = serde_json::to_string(&entry).unwrap();
        let back: AuditEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.compute_hash().unwrap(), entry.integrity_hash);
    }

    #[test]
    fn test_any_field_change_alters_hash() {
        let key = SigningKey::generate();
        let entry = sealed(1, ContentHash::zero(), &key);

        let mut tampered = entry.clone();
        tampered.action = "delete_client".into();
        assert_ne!(tampered.compute_hash().unwrap(), entry.integrity_hash);

        let mut tampered = entry.clone();
        tampered.risk_score = 0;
        assert_ne!(tampered.compute_hash().unwrap(), entry.integrity_hash);

        let mut tampered = entry.clone();
        tampered.sequence_number = 2;
        assert_ne!(tampered.compute_hash().unwrap(), entry.integrity_hash);

        let mut tampered = entry;
        tampered.previous_hash = ContentHash::hash(b"other");
        assert_ne!(tampered.compute_hash().unwrap(), tampered.integrity_hash);
    }

    #[test]
    fn test_follows() {
        let key = SigningKey::generate();
        let first = sealed(1, ContentHash::zero(), &key);
        let second = sealed(2, first.integrity_hash, &key);
        assert!(second.follows(&first));
        assert!(!first.follows(&second));
    }

    #[test]
    fn test_occurred_at_defaults_to_timestamp() {
        let key = SigningKey::generate();
        let entry = sealed(1, ContentHash::zero(), &key);
        assert_eq!(entry.occurred_at, entry.timestamp);
    }
}
