//! Common types used throughout Custos.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};

/// Identity of whoever performed an audited action.
///
/// Collaborators pass their own user identifiers (coach, client, admin);
/// background tasks use [`ActorId::system`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorId(pub String);

impl ActorId {
    /// Reserved identity for actions initiated by the subsystem itself.
    pub const SYSTEM: &'static str = "system";

    /// Create an actor ID.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EmptyActor`] if `id` is empty or whitespace.
    pub fn new(id: impl Into<String>) -> CoreResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CoreError::EmptyActor);
        }
        Ok(Self(id))
    }

    /// The system actor.
    #[must_use]
    pub fn system() -> Self {
        Self(Self::SYSTEM.to_string())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor:{}", self.0)
    }
}

/// UTC instant attached to events, entries and key records.
///
/// Serialized as RFC 3339 with full sub-second precision, so a stored
/// timestamp round-trips byte-for-byte and can participate in hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    /// Wall clock, UTC.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Wrap a chrono instant.
    #[must_use]
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    /// Hour of day (0-23, UTC).
    #[must_use]
    pub fn hour(&self) -> u8 {
        // `hour()` is always < 24.
        u8::try_from(self.0.hour()).unwrap_or(0)
    }

    /// Add a whole number of days, saturating at the representable range.
    #[must_use]
    pub fn plus_days(&self, days: u32) -> Self {
        Self(
            self.0
                .checked_add_signed(Duration::days(i64::from(days)))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }

    /// Whole days elapsed between `self` and `later` (zero if `later` is earlier).
    #[must_use]
    pub fn days_until(&self, later: &Timestamp) -> i64 {
        later.0.signed_duration_since(self.0).num_days().max(0)
    }

}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

/// Second precision, for logs and reports.
impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(at: DateTime<Utc>) -> Self {
        Self(at)
    }
}

/// Logical key category selecting which active key an operation uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPurpose {
    /// Field-level encryption of application records.
    Data,
    /// Encryption of offline backups.
    Backup,
    /// Encryption of payloads in transit between services.
    Transit,
}

impl KeyPurpose {
    /// Every purpose, in a stable order.
    pub const ALL: [KeyPurpose; 3] = [Self::Data, Self::Backup, Self::Transit];

    /// Lowercase name as used in configuration and persisted records.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Backup => "backup",
            Self::Transit => "transit",
        }
    }
}

impl fmt::Display for KeyPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyPurpose {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "data" => Ok(Self::Data),
            "backup" => Ok(Self::Backup),
            "transit" => Ok(Self::Transit),
            other => Err(CoreError::UnknownPurpose(other.to_string())),
        }
    }
}

/// Risk level classification for audited events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Routine activity.
    Low,
    /// Worth reviewing in aggregate.
    Medium,
    /// Should be reviewed individually.
    High,
    /// Requires immediate attention.
    Critical,
}

impl RiskLevel {
    /// Map a 0-100 risk score onto a level.
    #[must_use]
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => Self::Critical,
            60..=79 => Self::High,
            30..=59 => Self::Medium,
            _ => Self::Low,
        }
    }

    /// Additional risk points contributed when a caller supplies this level as a hint.
    #[must_use]
    pub const fn hint_weight(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 5,
            Self::High => 10,
            Self::Critical => 20,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        })
    }
}
