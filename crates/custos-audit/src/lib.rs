//! Custos Audit - Tamper-evident audit ledger.
//!
//! This crate provides:
//! - [`AuditLedger`]: append-only, gapless, hash-chained and signed log of
//!   security-relevant events, with anomaly and risk scoring, threat rules
//!   and alerting
//! - [`IntegrityVerifier`]: re-derives the chain from stored bytes and
//!   reports deletion, reordering, field tampering and forged signatures
//! - [`BaselineStore`]: per-actor behavioral profiles the scorer compares
//!   each event against
//! - An append-only investigation side table that never touches the chain
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use custos_audit::{
//!     AuditEvent, AuditLedger, BaselineStore, KvAuditStorage, LedgerSettings, TracingNotifier,
//! };
//! use custos_core::{ActorId, EventCategory};
//! use custos_crypto::SigningKey;
//!
//! let ledger = AuditLedger::open(
//!     Arc::new(KvAuditStorage::in_memory().unwrap()),
//!     SigningKey::generate(),
//!     Arc::new(BaselineStore::in_memory()),
//!     Arc::new(TracingNotifier),
//!     LedgerSettings::default(),
//! )
//! .unwrap();
//!
//! let entry = ledger
//!     .append(AuditEvent::new(ActorId::new("coach-7").unwrap(), "login").category(EventCategory::Authentication))
//!     .unwrap();
//! assert_eq!(entry.sequence_number, 1);
//! assert!(ledger.verify_range(1, 1).unwrap().is_valid);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod baseline;
mod entry;
mod error;
mod investigation;
mod ledger;
mod notifier;
mod query;
mod scoring;
mod storage;
mod threat;
mod verify;

pub use baseline::{BaselineStore, BehavioralBaseline, HourRange};
pub use entry::{AuditEntry, AuditEvent, FieldChange};
pub use error::{AuditError, AuditResult};
pub use investigation::{
    InvestigationRecord, InvestigationStatus, LEDGER_SEQUENCE, current_status,
};
pub use ledger::{AuditLedger, LedgerSettings};
pub use notifier::{ChannelNotifier, SecurityAlert, SecurityNotifier, TracingNotifier};
pub use query::{AuditFilter, DEFAULT_LIMIT, QueryPage};
pub use scoring::{AnomalyAssessment, ScoringConfig};
pub use storage::{AuditStorage, ENTRY_NAMESPACE, KvAuditStorage, StoredEntry, entry_key};
pub use threat::{ThreatConfig, ThreatDetector, ThreatIndicator};
pub use verify::{ChainIssue, ChainVerificationReport, IntegrityVerifier};
