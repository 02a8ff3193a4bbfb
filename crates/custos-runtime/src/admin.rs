//! Audited administrative operations.
//!
//! Every call, successful or not, produces a ledger entry attributed to the
//! calling actor. What happens when that entry cannot be written depends on
//! whether the operation can be taken back:
//!
//! - read-only operations (metrics, policies, range verification) withhold
//!   their result and return [`RuntimeError::AuditUnavailable`];
//! - reversible operations (activation, policy changes) are undone and
//!   return [`RuntimeError::AuditUnavailable`];
//! - irreversible key operations (rotation, export, import, purge) have
//!   already happened, so the failure is logged at `error!` and the result
//!   is returned.

use std::sync::Arc;

use custos_audit::{AuditEvent, AuditLedger, ChainVerificationReport, FieldChange};
use custos_core::{ActorId, DataClassification, EventCategory, KeyPurpose, RiskLevel};
use custos_keys::{KeyId, KeyManager, KeyMetrics, KeyStatus, PolicySet, RotationPolicy};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::actions::{self, admin_event, key_event, with_key};
use crate::error::{RuntimeError, RuntimeResult};

/// The administrative surface over the key manager and the ledger.
pub struct AdminService {
    keys: Arc<KeyManager>,
    ledger: Arc<AuditLedger>,
}

impl std::fmt::Debug for AdminService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminService").finish_non_exhaustive()
    }
}

impl AdminService {
    /// Administer `keys`, auditing into `ledger`.
    #[must_use]
    pub fn new(keys: Arc<KeyManager>, ledger: Arc<AuditLedger>) -> Self {
        Self { keys, ledger }
    }

    /// The managed key ring.
    #[must_use]
    pub fn key_manager(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// The ledger administrative actions are recorded in.
    #[must_use]
    pub fn ledger(&self) -> &Arc<AuditLedger> {
        &self.ledger
    }

    // ---------------------------------------------------------------------
    // Recording
    // ---------------------------------------------------------------------

    /// Record a completed operation that cannot be undone.
    fn record_completed(&self, operation: &'static str, event: AuditEvent) {
        if let Err(e) = self.ledger.append(event) {
            error!(
                operation,
                error = %e,
                "Key operation completed but its audit entry could not be written"
            );
        }
    }

    /// Record an operation whose result depends on the entry being written.
    fn record_required(&self, operation: &'static str, event: AuditEvent) -> RuntimeResult<()> {
        self.ledger.append(event).map(|_| ()).map_err(|source| {
            error!(operation, error = %source, "Audit entry could not be written; refusing");
            RuntimeError::AuditUnavailable { operation, source }
        })
    }

    /// Record a failed operation and hand its error back.
    fn record_failure<E>(&self, operation: &'static str, event: AuditEvent, err: E) -> RuntimeError
    where
        E: Into<RuntimeError> + std::fmt::Display,
    {
        warn!(operation, error = %err, "Administrative operation failed");
        let event = event.failed().meta("error", err.to_string());
        if let Err(e) = self.ledger.append(event) {
            error!(operation, error = %e, "Audit entry for failed operation could not be written");
        }
        err.into()
    }

    // ---------------------------------------------------------------------
    // Key lifecycle
    // ---------------------------------------------------------------------

    /// Rotate the active key of `purpose`.
    ///
    /// Without `force` the rotation must be due and the policy must not
    /// require approval (use [`approve_rotation`](Self::approve_rotation)).
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Key`] wrapping `RotationNotDue`,
    /// `ApprovalRequired` or a persistence failure.
    pub fn rotate_key(
        &self,
        purpose: KeyPurpose,
        force: bool,
        reason: &str,
        actor: &ActorId,
    ) -> RuntimeResult<KeyStatus> {
        let previous = self.keys.get_active_key(purpose).ok().map(|k| k.status());
        let event = key_event(actor, actions::KEY_ROTATED)
            .meta("purpose", purpose.as_str())
            .meta("forced", force)
            .description(reason)
            .risk_hint(if force { RiskLevel::Medium } else { RiskLevel::Low });

        match self.keys.rotate_key(purpose, force) {
            Ok(key) => {
                let status = key.status();
                self.record_completed("rotate_key", rotated_event(event, &status, previous.as_ref()));
                info!(%purpose, %actor, force, "Key rotated by administrator");
                Ok(status)
            },
            Err(e) => Err(self.record_failure("rotate_key", event, e)),
        }
    }

    /// Rotate a due key of an approval-gated purpose, with `approver`
    /// satisfying the gate.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Key`] wrapping `RotationNotDue` or a
    /// persistence failure.
    pub fn approve_rotation(
        &self,
        purpose: KeyPurpose,
        reason: &str,
        approver: &ActorId,
    ) -> RuntimeResult<KeyStatus> {
        let previous = self.keys.get_active_key(purpose).ok().map(|k| k.status());
        let event = key_event(approver, actions::KEY_ROTATED)
            .meta("purpose", purpose.as_str())
            .meta("approved_by", approver.as_str())
            .description(reason);

        match self.keys.rotate_key_approved(purpose, approver.as_str()) {
            Ok(key) => {
                let status = key.status();
                self.record_completed(
                    "approve_rotation",
                    rotated_event(event, &status, previous.as_ref()),
                );
                Ok(status)
            },
            Err(e) => Err(self.record_failure("approve_rotation", event, e)),
        }
    }

    /// Make an inactive key the active key of its purpose.
    ///
    /// Undone if the audit entry cannot be written.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::Key`] wrapping `KeyNotFound`, `KeyPurged` or a
    ///   persistence failure
    /// - [`RuntimeError::AuditUnavailable`] after a rollback
    pub fn activate_key(&self, key_id: KeyId, actor: &ActorId) -> RuntimeResult<KeyStatus> {
        let event = key_event(actor, actions::KEY_ACTIVATED)
            .resource("encryption_key", key_id.to_string())
            .risk_hint(RiskLevel::Medium);

        let target = match self.keys.get_key(key_id) {
            Ok(key) => key,
            Err(e) => return Err(self.record_failure("activate_key", event, e)),
        };
        let previous = self
            .keys
            .get_active_key(target.purpose)
            .ok()
            .map(|k| k.status());

        let activated = match self.keys.activate_key(key_id, Some(actor.as_str())) {
            Ok(key) => key.status(),
            Err(e) => return Err(self.record_failure("activate_key", event, e)),
        };

        let mut event = with_key(event, &activated);
        if let Some(prev) = previous.as_ref().filter(|p| p.key_id != key_id) {
            event = event.change(FieldChange::new(
                "active_key_id",
                Some(Value::from(prev.key_id.to_string())),
                Some(Value::from(activated.key_id.to_string())),
            ));
        }
        if let Err(e) = self.record_required("activate_key", event) {
            if let Some(prev) = previous.filter(|p| p.key_id != key_id) {
                match self.keys.activate_key(prev.key_id, Some(ActorId::SYSTEM)) {
                    Ok(_) => warn!(key_id = %prev.key_id, "Activation rolled back"),
                    Err(rollback) => error!(
                        key_id = %prev.key_id,
                        error = %rollback,
                        "Activation could not be rolled back"
                    ),
                }
            }
            return Err(e);
        }
        Ok(activated)
    }

    /// Export a key wrapped under `password`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Key`] wrapping `WeakPassword`, `KeyNotFound`
    /// or `KeyPurged`.
    pub fn export_key(
        &self,
        key_id: KeyId,
        password: &str,
        actor: &ActorId,
    ) -> RuntimeResult<String> {
        let event = key_event(actor, actions::KEY_EXPORTED)
            .classification(DataClassification::Restricted)
            .resource("encryption_key", key_id.to_string())
            .record_count(1)
            .risk_hint(RiskLevel::High);

        let status = match self.keys.get_key(key_id) {
            Ok(key) => key.status(),
            Err(e) => return Err(self.record_failure("export_key", event, e)),
        };
        let event = with_key(event, &status);
        match self.keys.export_key(key_id, password, Some(actor.as_str())) {
            Ok(blob) => {
                self.record_completed("export_key", event);
                Ok(blob)
            },
            Err(e) => Err(self.record_failure("export_key", event, e)),
        }
    }

    /// Import an exported key. It arrives inactive.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Key`] wrapping `WeakPassword`,
    /// `InvalidExport`, `AuthenticationFailed` or `KeyAlreadyExists`.
    pub fn import_key(
        &self,
        blob: &str,
        password: &str,
        actor: &ActorId,
    ) -> RuntimeResult<KeyStatus> {
        let event = key_event(actor, actions::KEY_IMPORTED)
            .classification(DataClassification::Restricted)
            .risk_hint(RiskLevel::Medium);

        match self.keys.import_key(blob, password, Some(actor.as_str())) {
            Ok(key) => {
                let status = key.status();
                self.record_completed("import_key", with_key(event, &status));
                Ok(status)
            },
            Err(e) => Err(self.record_failure("import_key", event, e)),
        }
    }

    /// Purge retired keys past their retention window.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Key`] if the purge could not be persisted.
    pub fn cleanup_expired_keys(&self, actor: &ActorId) -> RuntimeResult<usize> {
        let event = key_event(actor, actions::KEYS_PURGED).description("administrative cleanup");
        match self.keys.cleanup_expired_keys() {
            Ok(purged) => {
                self.record_completed("cleanup_expired_keys", event.meta("count", purged));
                Ok(purged)
            },
            Err(e) => Err(self.record_failure("cleanup_expired_keys", event, e)),
        }
    }

    // ---------------------------------------------------------------------
    // Reporting and policy
    // ---------------------------------------------------------------------

    /// Per-purpose key statistics.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::AuditUnavailable`] if the read cannot be recorded.
    pub fn metrics(&self, actor: &ActorId) -> RuntimeResult<KeyMetrics> {
        let event = key_event(actor, actions::KEY_METRICS_VIEWED)
            .classification(DataClassification::Internal);
        let metrics = match self.keys.metrics() {
            Ok(m) => m,
            Err(e) => return Err(self.record_failure("metrics", event, e)),
        };
        self.record_required("metrics", event)?;
        Ok(metrics)
    }

    /// Rotation policies in effect.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::AuditUnavailable`] if the read cannot be recorded.
    pub fn rotation_policies(&self, actor: &ActorId) -> RuntimeResult<PolicySet> {
        let event = key_event(actor, actions::POLICIES_VIEWED)
            .classification(DataClassification::Internal);
        let policies = match self.keys.policies() {
            Ok(p) => p,
            Err(e) => return Err(self.record_failure("rotation_policies", event, e)),
        };
        self.record_required("rotation_policies", event)?;
        Ok(policies)
    }

    /// Replace the policy of one purpose. Returns the previous policy.
    ///
    /// Undone if the audit entry cannot be written.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::Key`] wrapping `InvalidPolicy`
    /// - [`RuntimeError::AuditUnavailable`] after a rollback
    pub fn update_rotation_policy(
        &self,
        policy: RotationPolicy,
        actor: &ActorId,
    ) -> RuntimeResult<RotationPolicy> {
        let purpose = policy.purpose;
        let event = key_event(actor, actions::POLICY_UPDATED)
            .resource("rotation_policy", purpose.as_str())
            .risk_hint(RiskLevel::Medium);

        let old = match self.keys.policy(purpose) {
            Ok(p) => p,
            Err(e) => return Err(self.record_failure("update_rotation_policy", event, e)),
        };
        if let Err(e) = self.keys.update_policy(policy.clone()) {
            return Err(self.record_failure("update_rotation_policy", event, e));
        }

        let event = policy_changes(&old, &policy)
            .into_iter()
            .fold(event, AuditEvent::change);
        if let Err(e) = self.record_required("update_rotation_policy", event) {
            match self.keys.update_policy(old) {
                Ok(()) => warn!(%purpose, "Policy update rolled back"),
                Err(rollback) => {
                    error!(%purpose, error = %rollback, "Policy update could not be rolled back");
                },
            }
            return Err(e);
        }
        info!(%purpose, %actor, "Rotation policy updated");
        Ok(old)
    }

    /// Verify the ledger over `from..=to`.
    ///
    /// An invalid chain is reported, not returned as an error.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::Audit`] if verification could not run
    /// - [`RuntimeError::AuditUnavailable`] if the check cannot be recorded
    pub fn verify_range(
        &self,
        from: u64,
        to: u64,
        actor: &ActorId,
    ) -> RuntimeResult<ChainVerificationReport> {
        let event = admin_event(actor, actions::LEDGER_VERIFIED)
            .resource("audit_ledger", format!("{from}-{to}"));
        let report = match self.ledger.verify_range(from, to) {
            Ok(r) => r,
            Err(e) => return Err(self.record_failure("verify_range", event, e)),
        };

        let mut event = event
            .meta("is_valid", report.is_valid)
            .meta("entries_verified", report.entries_verified)
            .meta("issues", report.issues.len());
        if !report.is_valid {
            event = event
                .category(EventCategory::Security)
                .meta("broken_chain_at", report.broken_chain_at)
                .risk_hint(RiskLevel::Critical);
        }
        self.record_required("verify_range", event)?;
        Ok(report)
    }
}

fn rotated_event(event: AuditEvent, current: &KeyStatus, previous: Option<&KeyStatus>) -> AuditEvent {
    let event = with_key(event, current);
    match previous {
        Some(prev) => event
            .meta("previous_key_id", prev.key_id.to_string())
            .meta("previous_version", prev.version),
        None => event,
    }
}

/// One change per policy field that differs.
fn policy_changes(old: &RotationPolicy, new: &RotationPolicy) -> Vec<FieldChange> {
    let (Ok(Value::Object(old)), Ok(Value::Object(new))) =
        (serde_json::to_value(old), serde_json::to_value(new))
    else {
        return Vec::new();
    };
    new.into_iter()
        .filter(|(field, value)| old.get(field) != Some(value))
        .map(|(field, value)| {
            let before = old.get(&field).cloned();
            FieldChange::new(field, before, Some(value))
        })
        .collect()
}
