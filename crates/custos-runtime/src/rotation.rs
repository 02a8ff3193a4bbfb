//! The periodic key rotation sweep.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use custos_audit::{AuditEvent, AuditLedger};
use custos_core::{ActorId, KeyPurpose, RiskLevel, Timestamp};
use custos_keys::{KeyError, KeyId, KeyManager, KeyStatus};
use custos_telemetry::OperationContext;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::actions::{self, key_event, with_key};
use crate::error::{RuntimeError, RuntimeResult};
use crate::scheduler::{ScheduledTask, TaskOutcome};

/// A key the sweep rotated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotatedKey {
    /// Purpose.
    pub purpose: KeyPurpose,
    /// The key that was retired.
    pub previous: KeyStatus,
    /// The newly active key.
    pub current: KeyStatus,
}

/// What one sweep found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RotationSweepReport {
    /// Keys rotated automatically.
    pub rotated: Vec<RotatedKey>,
    /// Due keys whose policy requires an approver.
    pub awaiting_approval: Vec<KeyStatus>,
    /// Due keys of purposes without auto-rotation.
    pub manual_rotation_due: Vec<KeyStatus>,
    /// Rotations that failed, with the error.
    pub failed: Vec<(KeyPurpose, String)>,
    /// Retired keys whose material was purged.
    pub purged: usize,
    /// Newly seen keys inside their notice window.
    pub expiring_soon: Vec<KeyStatus>,
    /// Newly seen keys beyond their maximum age.
    pub over_max_age: Vec<KeyStatus>,
    /// Usage counters written.
    pub flushed: usize,
    /// Ledger entries that could not be written.
    pub audit_failures: usize,
}

impl RotationSweepReport {
    /// Whether the sweep found nothing worth recording.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.rotated.is_empty()
            && self.awaiting_approval.is_empty()
            && self.manual_rotation_due.is_empty()
            && self.failed.is_empty()
            && self.purged == 0
            && self.expiring_soon.is_empty()
            && self.over_max_age.is_empty()
    }

    fn summary(&self) -> String {
        format!(
            "rotated={} awaiting_approval={} manual_due={} failed={} purged={} expiring={} over_max_age={}",
            self.rotated.len(),
            self.awaiting_approval.len(),
            self.manual_rotation_due.len(),
            self.failed.len(),
            self.purged,
            self.expiring_soon.len(),
            self.over_max_age.len(),
        )
    }
}

/// Which report a key has already been logged under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Notice {
    AwaitingApproval,
    ManualDue,
    Expiring,
    OverMaxAge,
}

/// Drives [`KeyManager`] rotation and cleanup on a schedule.
///
/// Standing conditions (a key awaiting approval, inside its notice window or
/// past its maximum age) are written to the ledger once per key per process,
/// not on every sweep.
pub struct RotationScheduler {
    keys: Arc<KeyManager>,
    ledger: Arc<AuditLedger>,
    actor: ActorId,
    reported: Mutex<HashSet<(KeyId, Notice)>>,
}

impl std::fmt::Debug for RotationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotationScheduler")
            .field("actor", &self.actor)
            .finish_non_exhaustive()
    }
}

impl RotationScheduler {
    /// Sweep `keys`, recording outcomes in `ledger` as the system actor.
    #[must_use]
    pub fn new(keys: Arc<KeyManager>, ledger: Arc<AuditLedger>) -> Self {
        Self {
            keys,
            ledger,
            actor: ActorId::system(),
            reported: Mutex::new(HashSet::new()),
        }
    }

    /// Run one sweep.
    ///
    /// # Errors
    ///
    /// Returns an error only when the key ring cannot be read at all.
    /// Individual rotation, cleanup and ledger failures are collected in
    /// the report and retried on the next sweep.
    pub fn sweep(&self) -> RuntimeResult<RotationSweepReport> {
        let now = Timestamp::now();
        let mut report = RotationSweepReport::default();

        for status in self.keys.due_for_rotation(&now)? {
            let policy = self.keys.policy(status.purpose)?;
            if policy.requires_approval {
                if self.first_report(status.key_id, Notice::AwaitingApproval)? {
                    warn!(purpose = %status.purpose, key_id = %status.key_id, "Key due; rotation awaits approval");
                    report.awaiting_approval.push(status);
                }
            } else if !policy.auto_rotate {
                if self.first_report(status.key_id, Notice::ManualDue)? {
                    warn!(purpose = %status.purpose, key_id = %status.key_id, "Key due; auto-rotation disabled");
                    report.manual_rotation_due.push(status);
                }
            } else {
                match self.keys.rotate_key(status.purpose, false) {
                    Ok(new_key) => report.rotated.push(RotatedKey {
                        purpose: status.purpose,
                        previous: status,
                        current: new_key.status(),
                    }),
                    // Rotated elsewhere between the query and the attempt.
                    Err(KeyError::RotationNotDue { .. }) => {},
                    Err(e) => {
                        error!(purpose = %status.purpose, error = %e, "Scheduled rotation failed");
                        report.failed.push((status.purpose, e.to_string()));
                    },
                }
            }
        }

        match self.keys.cleanup_expired_keys() {
            Ok(purged) => report.purged = purged,
            Err(e) => error!(error = %e, "Key cleanup failed; retrying next sweep"),
        }

        for status in self.keys.expiring_within_notice(&now)? {
            if self.first_report(status.key_id, Notice::Expiring)? {
                report.expiring_soon.push(status);
            }
        }
        for status in self.keys.exceeding_max_age(&now)? {
            if self.first_report(status.key_id, Notice::OverMaxAge)? {
                warn!(purpose = %status.purpose, key_id = %status.key_id, "Active key exceeds maximum age");
                report.over_max_age.push(status);
            }
        }

        match self.keys.flush() {
            Ok(flushed) => report.flushed = flushed,
            Err(e) => warn!(error = %e, "Usage counter flush failed; retrying next sweep"),
        }

        if !report.is_noop() {
            report.audit_failures = self.record(&report);
            info!(summary = %report.summary(), "Rotation sweep finished");
        }
        Ok(report)
    }

    fn first_report(&self, key_id: KeyId, notice: Notice) -> RuntimeResult<bool> {
        let mut reported = self.reported.lock().map_err(|e| {
            RuntimeError::Key(KeyError::Internal(format!("notice tracker poisoned: {e}")))
        })?;
        Ok(reported.insert((key_id, notice)))
    }

    /// Write the report to the ledger. Returns how many entries failed.
    fn record(&self, report: &RotationSweepReport) -> usize {
        let mut events: Vec<AuditEvent> = Vec::new();

        for rotated in &report.rotated {
            events.push(
                with_key(key_event(&self.actor, actions::KEY_ROTATED), &rotated.current)
                    .description("scheduled rotation")
                    .meta("previous_key_id", rotated.previous.key_id.to_string())
                    .meta("previous_version", rotated.previous.version),
            );
        }
        for (purpose, reason) in &report.failed {
            events.push(
                key_event(&self.actor, actions::KEY_ROTATION_FAILED)
                    .description(format!("scheduled rotation failed: {reason}"))
                    .meta("purpose", purpose.as_str())
                    .risk_hint(RiskLevel::High)
                    .failed(),
            );
        }
        for status in &report.awaiting_approval {
            events.push(
                with_key(key_event(&self.actor, actions::KEY_ROTATION_AWAITING_APPROVAL), status)
                    .description("rotation due; policy requires approval"),
            );
        }
        for status in &report.manual_rotation_due {
            events.push(
                with_key(key_event(&self.actor, actions::KEY_ROTATION_MANUAL_DUE), status)
                    .description("rotation due; auto-rotation disabled"),
            );
        }
        if report.purged > 0 {
            events.push(
                key_event(&self.actor, actions::KEYS_PURGED)
                    .description("retention elapsed; key material destroyed")
                    .meta("count", report.purged),
            );
        }
        for status in &report.expiring_soon {
            events.push(
                with_key(key_event(&self.actor, actions::KEY_EXPIRY_NOTICE), status)
                    .description(format!("rotation due at {}", status.expires_at)),
            );
        }
        for status in &report.over_max_age {
            events.push(
                with_key(key_event(&self.actor, actions::KEY_MAX_AGE_EXCEEDED), status)
                    .description("active key exceeds maximum age")
                    .risk_hint(RiskLevel::High),
            );
        }

        let mut failures = 0usize;
        for event in events {
            let action = event.action.clone();
            if let Err(e) = self.ledger.append(event) {
                error!(%action, error = %e, "Failed to record sweep outcome");
                failures = failures.saturating_add(1);
            }
        }
        failures
    }
}

impl ScheduledTask for RotationScheduler {
    fn name(&self) -> &'static str {
        "key_rotation"
    }

    fn run(&self) -> RuntimeResult<TaskOutcome> {
        let guard = OperationContext::new("custos-runtime", "key_rotation_sweep")
            .with_actor(self.actor.as_str())
            .enter();
        match self.sweep() {
            Ok(report) if report.is_noop() => {
                guard.succeed();
                Ok(TaskOutcome::Idle)
            },
            Ok(report) => {
                guard.succeed();
                Ok(TaskOutcome::Completed {
                    summary: report.summary(),
                })
            },
            Err(e) => {
                guard.fail(e.to_string());
                Err(e)
            },
        }
    }
}
