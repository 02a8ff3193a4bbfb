//! Per-actor behavioral baselines.
//!
//! A baseline is the rolling profile the anomaly scorer compares each event
//! against: when the actor usually works, where they connect from, which
//! clients they use and which actions they normally perform. Baselines are
//! updated incrementally on every append and never deleted. Each collection
//! is bounded and evicts its oldest element first.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use custos_core::{ActorId, Timestamp};
use custos_storage::{BlockingKvStore, KvStore};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::entry::AuditEntry;
use crate::error::{AuditError, AuditResult};
use crate::scoring::ScoringConfig;

/// Namespace for persisted baselines.
const NS_BASELINES: &str = "audit:baselines";

/// An inclusive range of hours that may wrap midnight (`22..=5`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourRange {
    /// First hour.
    pub start: u8,
    /// Last hour (inclusive).
    pub end: u8,
}

impl HourRange {
    /// Build a range.
    #[must_use]
    pub const fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }

    /// Whether `hour` falls inside the range.
    #[must_use]
    pub fn contains(&self, hour: u8) -> bool {
        if self.start <= self.end {
            (self.start..=self.end).contains(&hour)
        } else {
            hour >= self.start || hour <= self.end
        }
    }
}

/// The rolling profile of one actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehavioralBaseline {
    /// Whose profile this is.
    pub actor: ActorId,
    /// Events per hour of day (UTC).
    pub hour_histogram: [u64; 24],
    /// Learned working hours, once enough events have been seen.
    pub normal_hours: Option<HourRange>,
    /// Network origins, oldest first.
    pub known_origins: Vec<String>,
    /// User agents, oldest first.
    pub known_user_agents: Vec<String>,
    /// Actions performed, oldest first.
    pub typical_actions: Vec<String>,
    /// Events recorded.
    pub event_count: u64,
    /// First event.
    pub first_seen: Timestamp,
    /// Most recent event.
    pub last_seen: Timestamp,
}

/// Insert `value` if absent, evicting the oldest element beyond `cap`.
fn remember(list: &mut Vec<String>, value: &str, cap: usize) {
    if list.iter().any(|v| v == value) {
        return;
    }
    list.push(value.to_string());
    if list.len() > cap {
        let excess = list.len().saturating_sub(cap);
        list.drain(..excess);
    }
}

/// The shortest circular window of hours covering `coverage_percent` of events.
fn shortest_covering_window(histogram: &[u64; 24], coverage_percent: u8) -> Option<HourRange> {
    let total: u64 = histogram.iter().fold(0u64, |acc, n| acc.saturating_add(*n));
    if total == 0 {
        return None;
    }
    let needed = total.saturating_mul(u64::from(coverage_percent));
    for len in 1..=24usize {
        for start in 0..24usize {
            let covered = (0..len)
                .map(|offset| histogram[start.wrapping_add(offset) % 24])
                .fold(0u64, |acc, n| acc.saturating_add(n));
            if covered.saturating_mul(100) >= needed {
                let end = start.wrapping_add(len.saturating_sub(1)) % 24;
                return Some(HourRange::new(
                    u8::try_from(start).unwrap_or(0),
                    u8::try_from(end).unwrap_or(23),
                ));
            }
        }
    }
    None
}

impl BehavioralBaseline {
    /// An empty profile first seen at `at`.
    #[must_use]
    pub fn new(actor: ActorId, at: Timestamp) -> Self {
        Self {
            actor,
            hour_histogram: [0; 24],
            normal_hours: None,
            known_origins: Vec::new(),
            known_user_agents: Vec::new(),
            typical_actions: Vec::new(),
            event_count: 0,
            first_seen: at,
            last_seen: at,
        }
    }

    /// Whether enough events have been seen to trust the profile.
    #[must_use]
    pub fn is_warm(&self, config: &ScoringConfig) -> bool {
        self.event_count >= config.warmup_events
    }

    /// Fold one appended entry into the profile.
    pub fn observe(&mut self, entry: &AuditEntry, config: &ScoringConfig) {
        let hour = usize::from(entry.occurred_at.hour()) % 24;
        self.hour_histogram[hour] = self.hour_histogram[hour].saturating_add(1);
        self.event_count = self.event_count.saturating_add(1);
        if entry.occurred_at < self.first_seen {
            self.first_seen = entry.occurred_at;
        }
        if entry.occurred_at > self.last_seen {
            self.last_seen = entry.occurred_at;
        }

        if let Some(ip) = &entry.ip_address {
            remember(&mut self.known_origins, ip, config.max_known_origins);
        }
        if let Some(ua) = &entry.user_agent {
            remember(&mut self.known_user_agents, ua, config.max_known_user_agents);
        }
        remember(&mut self.typical_actions, &entry.action, config.max_typical_actions);

        if self.is_warm(config) {
            self.normal_hours =
                shortest_covering_window(&self.hour_histogram, config.normal_hours_coverage_percent);
        }
    }

    /// Whether `action` has been seen before.
    #[must_use]
    pub fn knows_action(&self, action: &str) -> bool {
        self.typical_actions.iter().any(|a| a == action)
    }

    /// Whether `origin` has been seen before.
    #[must_use]
    pub fn knows_origin(&self, origin: &str) -> bool {
        self.known_origins.iter().any(|o| o == origin)
    }

    /// Whether `user_agent` has been seen before.
    #[must_use]
    pub fn knows_user_agent(&self, user_agent: &str) -> bool {
        self.known_user_agents.iter().any(|u| u == user_agent)
    }
}

/// Cache of baselines, optionally persisted.
pub struct BaselineStore {
    cache: RwLock<HashMap<ActorId, BehavioralBaseline>>,
    backend: Option<BlockingKvStore>,
}

impl std::fmt::Debug for BaselineStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaselineStore")
            .field("persistent", &self.backend.is_some())
            .finish_non_exhaustive()
    }
}

impl BaselineStore {
    /// Baselines held in memory only.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            backend: None,
        }
    }

    /// Baselines persisted to `store`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::PersistenceFailure`] if the namespace is invalid.
    pub fn persistent(store: Arc<dyn KvStore>) -> AuditResult<Self> {
        Ok(Self {
            cache: RwLock::new(HashMap::new()),
            backend: Some(BlockingKvStore::new(store, NS_BASELINES)?),
        })
    }

    /// The baseline of `actor`, if any event has been recorded.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Internal`] on a poisoned lock, or a storage
    /// error if the persisted record cannot be read.
    pub fn get(&self, actor: &ActorId) -> AuditResult<Option<BehavioralBaseline>> {
        {
            let cache = self
                .cache
                .read()
                .map_err(|e| AuditError::Internal(format!("baseline cache poisoned: {e}")))?;
            if let Some(baseline) = cache.get(actor) {
                return Ok(Some(baseline.clone()));
            }
        }
        let Some(backend) = &self.backend else {
            return Ok(None);
        };
        let loaded: Option<BehavioralBaseline> = backend.get_json(actor.as_str())?;
        if let Some(baseline) = &loaded {
            self.cache
                .write()
                .map_err(|e| AuditError::Internal(format!("baseline cache poisoned: {e}")))?
                .entry(actor.clone())
                .or_insert_with(|| baseline.clone());
        }
        Ok(loaded)
    }

    /// Fold `entry` into its actor's baseline.
    ///
    /// A persistence failure is logged and the in-memory profile is kept.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Internal`] on a poisoned lock.
    pub fn record(&self, entry: &AuditEntry, config: &ScoringConfig) -> AuditResult<()> {
        let existing = self.get(&entry.actor)?;
        let mut cache = self
            .cache
            .write()
            .map_err(|e| AuditError::Internal(format!("baseline cache poisoned: {e}")))?;
        let baseline = cache.entry(entry.actor.clone()).or_insert_with(|| {
            existing.unwrap_or_else(|| BehavioralBaseline::new(entry.actor.clone(), entry.occurred_at))
        });
        baseline.observe(entry, config);

        if let Some(backend) = &self.backend
            && let Err(e) = backend.set_json(entry.actor.as_str(), &*baseline)
        {
            warn!(actor = %entry.actor, error = %e, "Failed to persist behavioral baseline");
        }
        Ok(())
    }

    /// Replace an actor's baseline (seeding from historical data).
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Internal`] on a poisoned lock, or
    /// [`AuditError::PersistenceFailure`] if the write fails.
    pub fn put(&self, baseline: BehavioralBaseline) -> AuditResult<()> {
        if let Some(backend) = &self.backend {
            backend.set_json(baseline.actor.as_str(), &baseline)?;
        }
        self.cache
            .write()
            .map_err(|e| AuditError::Internal(format!("baseline cache poisoned: {e}")))?
            .insert(baseline.actor.clone(), baseline);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hour_range_wraps() {
        let night = HourRange::new(22, 5);
        assert!(night.contains(23));
        assert!(night.contains(0));
        assert!(night.contains(5));
        assert!(!night.contains(12));

        let day = HourRange::new(8, 19);
        assert!(day.contains(8));
        assert!(day.contains(19));
        assert!(!day.contains(3));
    }

    #[test]
    fn test_remember_evicts_oldest() {
        let mut list = Vec::new();
        for i in 0..5 {
            remember(&mut list, &format!("ip-{i}"), 3);
        }
        remember(&mut list, "ip-4", 3);
        assert_eq!(list, vec!["ip-2", "ip-3", "ip-4"]);
    }

    #[test]
    fn test_shortest_window_business_hours() {
        let mut hist = [0u64; 24];
        for h in 9..=17 {
            hist[h] = 10;
        }
        hist[2] = 1;
        assert_eq!(shortest_covering_window(&hist, 90), Some(HourRange::new(9, 17)));
    }

    #[test]
    fn test_shortest_window_wraps_midnight() {
        let mut hist = [0u64; 24];
        for h in [22, 23, 0, 1, 2] {
            hist[h] = 5;
        }
        assert_eq!(shortest_covering_window(&hist, 90), Some(HourRange::new(22, 2)));
    }

    #[test]
    fn test_empty_histogram_has_no_window() {
        assert_eq!(shortest_covering_window(&[0; 24], 90), None);
    }
}
