//! Anomaly and risk scoring.
//!
//! Both scores are integers in `0..=100`. The anomaly score measures how far
//! an event deviates from its actor's baseline; the risk score combines what
//! the event touched with how anomalous it was.

use custos_core::RiskLevel;
use serde::{Deserialize, Serialize};

use crate::baseline::{BehavioralBaseline, HourRange};
use crate::entry::AuditEvent;

/// Scoring weights and thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Points for activity outside normal hours.
    pub off_hours_weight: u8,
    /// Points for an action the actor has not performed before.
    pub unseen_action_weight: u8,
    /// Points for a network origin the actor has not used before.
    pub unseen_origin_weight: u8,
    /// Points for an unknown user agent (only once the baseline is warm).
    pub unseen_user_agent_weight: u8,
    /// Events before a baseline's learned hours replace the defaults.
    pub warmup_events: u64,
    /// Normal hours assumed until a baseline is warm.
    pub default_normal_hours: HourRange,
    /// Share of events the learned hour window must cover.
    pub normal_hours_coverage_percent: u8,
    /// Points for touching PHI.
    pub phi_weight: u8,
    /// Points for a failed outcome.
    pub failure_weight: u8,
    /// Percentage of the anomaly score added to the risk score.
    pub anomaly_risk_share_percent: u8,
    /// Risk score at which an alert is raised.
    pub risk_alert_threshold: u8,
    /// Anomaly score at which an alert is raised.
    pub anomaly_alert_threshold: u8,
    /// Known network origins kept per actor.
    pub max_known_origins: usize,
    /// Known user agents kept per actor.
    pub max_known_user_agents: usize,
    /// Typical actions kept per actor.
    pub max_typical_actions: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            off_hours_weight: 30,
            unseen_action_weight: 20,
            unseen_origin_weight: 25,
            unseen_user_agent_weight: 10,
            warmup_events: 10,
            default_normal_hours: HourRange::new(8, 19),
            normal_hours_coverage_percent: 90,
            phi_weight: 20,
            failure_weight: 15,
            anomaly_risk_share_percent: 30,
            risk_alert_threshold: 70,
            anomaly_alert_threshold: 25,
            max_known_origins: 64,
            max_known_user_agents: 32,
            max_typical_actions: 256,
        }
    }
}

/// Result of anomaly scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnomalyAssessment {
    /// Score, capped at 100.
    pub score: u8,
    /// Whether the event fell outside normal hours.
    pub off_hours: bool,
}

fn capped(points: u32) -> u8 {
    u8::try_from(points.min(100)).unwrap_or(100)
}

impl ScoringConfig {
    /// Normal hours for an actor: learned once warm, defaults otherwise.
    #[must_use]
    pub fn normal_hours(&self, baseline: Option<&BehavioralBaseline>) -> HourRange {
        baseline
            .filter(|b| b.is_warm(self))
            .and_then(|b| b.normal_hours)
            .unwrap_or(self.default_normal_hours)
    }

    /// Score how unusual `event` at `hour` is for its actor.
    ///
    /// An actor without a baseline is only scored on the hour.
    #[must_use]
    pub fn anomaly(
        &self,
        event: &AuditEvent,
        hour: u8,
        baseline: Option<&BehavioralBaseline>,
    ) -> AnomalyAssessment {
        let off_hours = !self.normal_hours(baseline).contains(hour);
        let mut points = 0u32;
        if off_hours {
            points = points.saturating_add(u32::from(self.off_hours_weight));
        }

        if let Some(baseline) = baseline {
            if !baseline.knows_action(&event.action) {
                points = points.saturating_add(u32::from(self.unseen_action_weight));
            }
            if let Some(ip) = &event.ip_address
                && !baseline.knows_origin(ip)
            {
                points = points.saturating_add(u32::from(self.unseen_origin_weight));
            }
            if baseline.is_warm(self)
                && let Some(ua) = &event.user_agent
                && !baseline.knows_user_agent(ua)
            {
                points = points.saturating_add(u32::from(self.unseen_user_agent_weight));
            }
        }

        AnomalyAssessment {
            score: capped(points),
            off_hours,
        }
    }

    /// Combine what `event` touched with its anomaly score.
    ///
    /// The level is never lower than the caller's hint.
    #[must_use]
    pub fn risk(&self, event: &AuditEvent, anomaly_score: u8) -> (u8, RiskLevel) {
        let mut points = u32::from(event.category.risk_weight())
            .saturating_add(u32::from(event.data_classification.risk_weight()));
        if event.phi {
            points = points.saturating_add(u32::from(self.phi_weight));
        }
        if event.outcome.is_failure() {
            points = points.saturating_add(u32::from(self.failure_weight));
        }
        let anomaly_share = u32::from(anomaly_score)
            .saturating_mul(u32::from(self.anomaly_risk_share_percent))
            .checked_div(100)
            .unwrap_or(0);
        points = points.saturating_add(anomaly_share);
        if let Some(hint) = event.risk_hint {
            points = points.saturating_add(u32::from(hint.hint_weight()));
        }

        let score = capped(points);
        let derived = RiskLevel::from_score(score);
        let level = event.risk_hint.map_or(derived, |hint| hint.max(derived));
        (score, level)
    }

    /// Whether scores this high warrant an alert.
    #[must_use]
    pub fn should_alert(&self, risk_score: u8, anomaly_score: u8) -> bool {
        risk_score >= self.risk_alert_threshold || anomaly_score >= self.anomaly_alert_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::AuditEntry;
    use custos_core::{ActorId, DataClassification, EventCategory, Timestamp};

    fn event(action: &str) -> AuditEvent {
        AuditEvent::new(ActorId::new("coach-3").unwrap(), action)
    }

    fn warm_baseline(config: &ScoringConfig) -> BehavioralBaseline {
        let mut b = BehavioralBaseline::new(ActorId::new("coach-3").unwrap(), Timestamp::now());
        b.known_origins.push("10.0.0.1".into());
        b.known_user_agents.push("Firefox".into());
        b.typical_actions.push("login".into());
        b.event_count = config.warmup_events;
        b.normal_hours = Some(HourRange::new(9, 17));
        b
    }

    #[test]
    fn test_new_actor_scored_on_hours_only() {
        let config = ScoringConfig::default();
        let e = event("anything").ip_address("1.2.3.4").user_agent("curl");
        assert_eq!(config.anomaly(&e, 10, None).score, 0);

        let night = config.anomaly(&e, 3, None);
        assert_eq!(night.score, 30);
        assert!(night.off_hours);
    }

    #[test]
    fn test_known_behaviour_scores_zero() {
        let config = ScoringConfig::default();
        let b = warm_baseline(&config);
        let e = event("login").ip_address("10.0.0.1").user_agent("Firefox");
        assert_eq!(config.anomaly(&e, 12, Some(&b)).score, 0);
    }

    #[test]
    fn test_everything_unseen_is_capped() {
        let config = ScoringConfig::default();
        let b = warm_baseline(&config);
        let e = event("export_all").ip_address("9.9.9.9").user_agent("curl");
        assert_eq!(config.anomaly(&e, 3, Some(&b)).score, 85);

        let heavy = ScoringConfig {
            off_hours_weight: 90,
            ..ScoringConfig::default()
        };
        assert_eq!(heavy.anomaly(&e, 3, Some(&b)).score, 100);
    }

    #[test]
    fn test_user_agent_ignored_until_warm() {
        let config = ScoringConfig::default();
        let mut b = warm_baseline(&config);
        b.event_count = 2;
        let e = event("login").ip_address("10.0.0.1").user_agent("curl");
        assert_eq!(config.anomaly(&e, 12, Some(&b)).score, 0);
    }

    #[test]
    fn test_cold_baseline_uses_default_hours() {
        let config = ScoringConfig::default();
        let mut b = warm_baseline(&config);
        b.event_count = 1;
        // 18:00 is outside the learned 9..=17 but inside the default 8..=19.
        let e = event("login");
        assert!(!config.anomaly(&e, 18, Some(&b)).off_hours);
    }

    #[test]
    fn test_risk_combines_weights() {
        let config = ScoringConfig::default();
        let e = event("view_notes")
            .category(EventCategory::DataAccess)
            .classification(DataClassification::Restricted)
            .phi(true);
        // 10 + 25 + 20 + 30% of 50
        let (score, level) = config.risk(&e, 50);
        assert_eq!(score, 70);
        assert_eq!(level, RiskLevel::High);
    }

    #[test]
    fn test_risk_level_respects_hint() {
        let config = ScoringConfig::default();
        let e = event("noop")
            .classification(DataClassification::Public)
            .risk_hint(RiskLevel::Critical);
        let (score, level) = config.risk(&e, 0);
        assert_eq!(score, 20);
        assert_eq!(level, RiskLevel::Critical);
    }

    #[test]
    fn test_risk_capped() {
        let config = ScoringConfig::default();
        let e = event("export")
            .category(EventCategory::DataExport)
            .classification(DataClassification::Restricted)
            .phi(true)
            .failed()
            .risk_hint(RiskLevel::Critical);
        assert_eq!(config.risk(&e, 100).0, 100);
    }

    #[test]
    fn test_alert_thresholds() {
        let config = ScoringConfig::default();
        assert!(config.should_alert(70, 0));
        assert!(config.should_alert(0, 25));
        assert!(!config.should_alert(69, 24));
    }

    #[test]
    fn test_learned_hours_feed_back() {
        let config = ScoringConfig::default();
        let key = custos_crypto::SigningKey::generate();
        let mut b = BehavioralBaseline::new(ActorId::new("night-owl").unwrap(), Timestamp::now());
        for _ in 0..config.warmup_events {
            let at = Timestamp::from_datetime(
                chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 1, 5, 23, 0, 0).unwrap(),
            );
            let entry = AuditEntry::sample(&key, "night-owl", "login", at);
            b.observe(&entry, &config);
        }
        assert_eq!(b.normal_hours, Some(HourRange::new(23, 23)));
        assert!(!config.anomaly(&event("login"), 23, Some(&b)).off_hours);
        assert!(config.anomaly(&event("login"), 12, Some(&b)).off_hours);
    }
}
