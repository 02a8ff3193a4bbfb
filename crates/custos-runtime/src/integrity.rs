//! Periodic verification of the most recent ledger entries.

use std::sync::Arc;

use custos_audit::{AuditEvent, AuditLedger, ChainVerificationReport};
use custos_core::{ActorId, DataClassification, EventCategory, RiskLevel};
use tracing::{debug, error};

use crate::actions;
use crate::error::RuntimeResult;
use crate::scheduler::{ScheduledTask, TaskOutcome};

/// Re-verifies the tail of the chain on a schedule.
///
/// A broken chain is logged, puts the ledger under investigation (see
/// [`AuditLedger::verify_range`]) and is itself recorded as a critical
/// security event. A clean pass writes nothing.
#[derive(Debug)]
pub struct IntegritySweep {
    ledger: Arc<AuditLedger>,
    window: u64,
}

impl IntegritySweep {
    /// Verify the last `window` entries on each run (at least one).
    #[must_use]
    pub fn new(ledger: Arc<AuditLedger>, window: u64) -> Self {
        Self {
            ledger,
            window: window.max(1),
        }
    }

    /// Verify the current window. `None` when the ledger is empty.
    ///
    /// # Errors
    ///
    /// Returns a storage error if verification could not run.
    pub fn check(&self) -> RuntimeResult<Option<ChainVerificationReport>> {
        let head = self.ledger.count()?;
        if head == 0 {
            return Ok(None);
        }
        let from = head.saturating_sub(self.window).saturating_add(1);
        let report = self.ledger.verify_range(from, head)?;

        if report.is_valid {
            debug!(from, to = head, entries = report.entries_verified, "Ledger tail verified");
        } else {
            error!(
                from,
                to = head,
                broken_chain_at = ?report.broken_chain_at,
                issues = report.issues.len(),
                "Ledger integrity violation detected"
            );
            let first_issue = report
                .issues
                .first()
                .map_or_else(String::new, ToString::to_string);
            let event = AuditEvent::new(ActorId::system(), actions::LEDGER_INTEGRITY_VIOLATION)
                .category(EventCategory::Security)
                .classification(DataClassification::Restricted)
                .resource("audit_ledger", format!("{from}-{head}"))
                .description(first_issue)
                .risk_hint(RiskLevel::Critical)
                .meta("issues", report.issues.len())
                .meta("broken_chain_at", report.broken_chain_at);
            if let Err(e) = self.ledger.append(event) {
                error!(error = %e, "Failed to record integrity violation");
            }
        }
        Ok(Some(report))
    }
}

impl ScheduledTask for IntegritySweep {
    fn name(&self) -> &'static str {
        "integrity_sweep"
    }

    fn run(&self) -> RuntimeResult<TaskOutcome> {
        Ok(match self.check()? {
            None => TaskOutcome::Idle,
            Some(report) if report.is_valid => TaskOutcome::Completed {
                summary: format!("verified {}..={}", report.from, report.to),
            },
            Some(report) => TaskOutcome::Completed {
                summary: format!(
                    "chain broken at {}",
                    report.broken_chain_at.unwrap_or(report.from)
                ),
            },
        })
    }
}
