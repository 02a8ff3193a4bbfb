//! Action names written to the audit ledger by the runtime.
//!
//! Query the ledger with [`AuditFilter::action`](custos_audit::AuditFilter::action)
//! and these constants to find key lifecycle and administrative events.

use custos_audit::AuditEvent;
use custos_core::{ActorId, DataClassification, EventCategory};
use custos_keys::KeyStatus;

/// A key was rotated (scheduled or administrative).
pub const KEY_ROTATED: &str = "key.rotated";
/// A rotation attempt failed; the previous key stays active.
pub const KEY_ROTATION_FAILED: &str = "key.rotation_failed";
/// A due key needs an approver before it can be rotated.
pub const KEY_ROTATION_AWAITING_APPROVAL: &str = "key.rotation_awaiting_approval";
/// A due key of a purpose without auto-rotation.
pub const KEY_ROTATION_MANUAL_DUE: &str = "key.rotation_manual_due";
/// A key is within its policy's notice window.
pub const KEY_EXPIRY_NOTICE: &str = "key.expiry_notice";
/// A key is older than its policy's maximum age.
pub const KEY_MAX_AGE_EXCEEDED: &str = "key.max_age_exceeded";
/// Retired key material was purged.
pub const KEYS_PURGED: &str = "key.purged";
/// An inactive key was made active.
pub const KEY_ACTIVATED: &str = "key.activated";
/// Key material left the process under a password.
pub const KEY_EXPORTED: &str = "key.exported";
/// An exported key was brought in.
pub const KEY_IMPORTED: &str = "key.imported";
/// Key metrics were read.
pub const KEY_METRICS_VIEWED: &str = "key.metrics_viewed";
/// Rotation policies were read.
pub const POLICIES_VIEWED: &str = "key.policies_viewed";
/// A rotation policy was changed.
pub const POLICY_UPDATED: &str = "key.policy_updated";
/// A ledger range was verified on request.
pub const LEDGER_VERIFIED: &str = "audit.range_verified";
/// The integrity sweep found a broken chain.
pub const LEDGER_INTEGRITY_VIOLATION: &str = "audit.integrity_violation";
/// A payload failed authentication on decrypt.
pub const DECRYPT_AUTH_FAILED: &str = "data.decrypt_auth_failed";
/// The subsystem started.
pub const SUBSYSTEM_STARTED: &str = "system.started";

/// A key-management event with the usual classification.
pub(crate) fn key_event(actor: &ActorId, action: &str) -> AuditEvent {
    AuditEvent::new(actor.clone(), action)
        .category(EventCategory::KeyManagement)
        .classification(DataClassification::Confidential)
}

/// An administrative event on the audit subsystem itself.
pub(crate) fn admin_event(actor: &ActorId, action: &str) -> AuditEvent {
    AuditEvent::new(actor.clone(), action)
        .category(EventCategory::Administration)
        .classification(DataClassification::Internal)
}

/// Attach a key's identity to an event.
pub(crate) fn with_key(event: AuditEvent, status: &KeyStatus) -> AuditEvent {
    event
        .resource("encryption_key", status.key_id.to_string())
        .meta("purpose", status.purpose.as_str())
        .meta("version", status.version)
}
