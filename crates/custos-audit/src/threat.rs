//! Rule-based threat detection.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use custos_core::{ActorId, EventCategory, Timestamp};
use serde::{Deserialize, Serialize};

use crate::entry::AuditEvent;
use crate::error::{AuditError, AuditResult};

/// A threat rule that fired for an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThreatIndicator {
    /// Too many failed authentications by one actor in a short window.
    RepeatedAuthFailures {
        /// Failures inside the window, this one included.
        count: u32,
        /// Window length.
        window_minutes: u32,
    },
    /// Export of many records at once.
    BulkExport {
        /// Records exported.
        records: u64,
    },
    /// PHI touched outside the actor's normal hours.
    OffHoursPhiAccess {
        /// Hour of day (UTC) of the access.
        hour: u8,
    },
    /// An action that grants or elevates privileges.
    PrivilegeEscalation {
        /// The action name.
        action: String,
    },
}

impl ThreatIndicator {
    /// Short rule name for logs and alerts.
    #[must_use]
    pub fn rule(&self) -> &'static str {
        match self {
            Self::RepeatedAuthFailures { .. } => "repeated_auth_failures",
            Self::BulkExport { .. } => "bulk_export",
            Self::OffHoursPhiAccess { .. } => "off_hours_phi_access",
            Self::PrivilegeEscalation { .. } => "privilege_escalation",
        }
    }
}

/// Thresholds for the threat rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatConfig {
    /// Failed authentications that trigger the rule.
    pub auth_failure_threshold: u32,
    /// Window for counting failed authentications.
    pub auth_failure_window_minutes: u32,
    /// Record count at which an export is considered bulk.
    pub bulk_export_threshold: u64,
    /// Action names treated as privilege escalation (case-insensitive).
    pub privilege_escalation_actions: Vec<String>,
}

impl Default for ThreatConfig {
    fn default() -> Self {
        Self {
            auth_failure_threshold: 5,
            auth_failure_window_minutes: 15,
            bulk_export_threshold: 500,
            privilege_escalation_actions: [
                "grant_role",
                "assign_role",
                "grant_admin",
                "elevate_privileges",
                "change_permissions",
                "impersonate_user",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Evaluates threat rules, tracking recent authentication failures per actor.
///
/// Only actors with a failure inside the window are tracked; the rest are
/// dropped whenever a failure is recorded.
pub struct ThreatDetector {
    config: ThreatConfig,
    auth_failures: Mutex<HashMap<ActorId, VecDeque<Timestamp>>>,
}

impl std::fmt::Debug for ThreatDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreatDetector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn is_export(event: &AuditEvent) -> bool {
    event.category == EventCategory::DataExport || event.action.to_lowercase().contains("export")
}

impl ThreatDetector {
    /// Create a detector.
    #[must_use]
    pub fn new(config: ThreatConfig) -> Self {
        Self {
            config,
            auth_failures: Mutex::new(HashMap::new()),
        }
    }

    /// The active thresholds.
    #[must_use]
    pub fn config(&self) -> &ThreatConfig {
        &self.config
    }

    /// Evaluate every rule for `event`.
    ///
    /// `off_hours` is the scorer's verdict for the event's hour.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Internal`] if the failure tracker lock is poisoned.
    pub fn evaluate(
        &self,
        event: &AuditEvent,
        at: Timestamp,
        off_hours: bool,
    ) -> AuditResult<Vec<ThreatIndicator>> {
        let mut indicators = Vec::new();

        if event.category == EventCategory::Authentication
            && event.outcome.is_failure()
            && let Some(count) = self.record_auth_failure(&event.actor, at)?
        {
            indicators.push(ThreatIndicator::RepeatedAuthFailures {
                count,
                window_minutes: self.config.auth_failure_window_minutes,
            });
        }

        if is_export(event)
            && let Some(records) = event.record_count
            && records >= self.config.bulk_export_threshold
        {
            indicators.push(ThreatIndicator::BulkExport { records });
        }

        if event.phi && off_hours {
            indicators.push(ThreatIndicator::OffHoursPhiAccess { hour: at.hour() });
        }

        if self
            .config
            .privilege_escalation_actions
            .iter()
            .any(|a| a.eq_ignore_ascii_case(&event.action))
        {
            indicators.push(ThreatIndicator::PrivilegeEscalation {
                action: event.action.clone(),
            });
        }

        Ok(indicators)
    }

    /// Record a failure and return the window count once it reaches the threshold.
    fn record_auth_failure(&self, actor: &ActorId, at: Timestamp) -> AuditResult<Option<u32>> {
        let window_secs = i64::from(self.config.auth_failure_window_minutes).saturating_mul(60);
        let expired = |t: &Timestamp| at.0.signed_duration_since(t.0).num_seconds() > window_secs;
        let mut failures = self
            .auth_failures
            .lock()
            .map_err(|e| AuditError::Internal(format!("auth failure tracker poisoned: {e}")))?;

        failures.retain(|_, recent| {
            while recent.front().is_some_and(expired) {
                recent.pop_front();
            }
            !recent.is_empty()
        });

        let recent = failures.entry(actor.clone()).or_default();
        recent.push_back(at);
        let count = u32::try_from(recent.len()).unwrap_or(u32::MAX);
        Ok((count >= self.config.auth_failure_threshold).then_some(count))
    }

    #[cfg(test)]
    fn tracked_actors(&self) -> usize {
        self.auth_failures.lock().map(|f| f.len()).unwrap_or(0)
    }
}
