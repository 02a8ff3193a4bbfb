//! Security alert delivery.

use custos_core::{ActorId, RiskLevel, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::entry::AuditEntry;
use crate::error::{AuditError, AuditResult};
use crate::threat::ThreatIndicator;

/// An alert raised for a high-risk, anomalous or threatening entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityAlert {
    /// Entry that triggered the alert.
    pub sequence_number: u64,
    /// Actor of the entry.
    pub actor: ActorId,
    /// Action of the entry.
    pub action: String,
    /// Risk level.
    pub risk_level: RiskLevel,
    /// Risk score.
    pub risk_score: u8,
    /// Anomaly score.
    pub anomaly_score: u8,
    /// Threat rules that fired.
    pub threat_indicators: Vec<ThreatIndicator>,
    /// When the alert was raised.
    pub raised_at: Timestamp,
}

impl SecurityAlert {
    /// Build an alert for `entry`.
    #[must_use]
    pub fn for_entry(entry: &AuditEntry) -> Self {
        Self {
            sequence_number: entry.sequence_number,
            actor: entry.actor.clone(),
            action: entry.action.clone(),
            risk_level: entry.risk_level,
            risk_score: entry.risk_score,
            anomaly_score: entry.anomaly_score,
            threat_indicators: entry.threat_indicators.clone(),
            raised_at: Timestamp::now(),
        }
    }

    /// One-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let rules: Vec<&str> = self.threat_indicators.iter().map(ThreatIndicator::rule).collect();
        format!(
            "entry {} by {} ({}): risk {} [{}], anomaly {}, threats [{}]",
            self.sequence_number,
            self.actor,
            self.action,
            self.risk_score,
            self.risk_level,
            self.anomaly_score,
            rules.join(", ")
        )
    }
}

/// Receives security alerts from the ledger.
///
/// Called synchronously after the entry is persisted. A failure is logged
/// by the ledger and never fails the append.
pub trait SecurityNotifier: Send + Sync {
    /// Deliver one alert.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Notification`] if delivery failed.
    fn notify(&self, alert: &SecurityAlert) -> AuditResult<()>;
}

/// Writes alerts to the log at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl SecurityNotifier for TracingNotifier {
    fn notify(&self, alert: &SecurityAlert) -> AuditResult<()> {
        warn!(
            sequence = alert.sequence_number,
            actor = %alert.actor,
            action = %alert.action,
            risk_score = alert.risk_score,
            anomaly_score = alert.anomaly_score,
            threats = alert.threat_indicators.len(),
            "Security alert"
        );
        Ok(())
    }
}

/// Forwards alerts to an async consumer over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<SecurityAlert>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiving end.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SecurityAlert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SecurityNotifier for ChannelNotifier {
    fn notify(&self, alert: &SecurityAlert) -> AuditResult<()> {
        self.tx
            .send(alert.clone())
            .map_err(|_| AuditError::Notification("alert receiver dropped".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custos_crypto::SigningKey;

    fn alert() -> SecurityAlert {
        let entry = AuditEntry::sample(&SigningKey::generate(), "mallory", "grant_role", Timestamp::now());
        SecurityAlert::for_entry(&entry)
    }

    #[tokio::test]
    async fn test_channel_delivers_to_async_consumer() {
        let (notifier, mut rx) = ChannelNotifier::new();
        let consumer = tokio::spawn(async move { rx.recv().await });
        notifier.notify(&alert()).unwrap();
        let got = consumer.await.unwrap().unwrap();
        assert_eq!(got.sequence_number, 1);
        assert_eq!(got.action, "grant_role");
    }

    #[test]
    fn test_channel_closed_is_an_error() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        assert!(matches!(
            notifier.notify(&alert()),
            Err(AuditError::Notification(_))
        ));
    }

    #[test]
    fn test_summary_mentions_actor() {
        let summary = alert().summary();
        assert!(summary.contains("actor:mallory"));
        assert!(summary.contains("grant_role"));
    }
}
