//! Classification of audited events.
//!
//! Collaborators tag every event with a category, the sensitivity of the
//! data it touched and its outcome. The ledger turns these tags into risk
//! points, so the weights live next to the types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of action an audited event represents.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Login, logout, MFA, password reset.
    Authentication,
    /// Permission checks and role changes.
    Authorization,
    /// Reading records.
    DataAccess,
    /// Creating, updating or deleting records.
    DataModification,
    /// Bulk export or download of records.
    DataExport,
    /// Configuration changes.
    Configuration,
    /// Key generation, rotation, activation, export, purge.
    KeyManagement,
    /// Administrative operations on the audit or key subsystem.
    Administration,
    /// Security findings (integrity failures, detected threats).
    Security,
    /// Background activity of the subsystem itself.
    #[default]
    System,
}

impl EventCategory {
    /// Risk points contributed by the category.
    #[must_use]
    pub const fn risk_weight(&self) -> u8 {
        match self {
            Self::System => 0,
            Self::Authentication | Self::DataAccess => 10,
            Self::Authorization | Self::DataModification | Self::Configuration => 15,
            Self::KeyManagement | Self::Administration => 20,
            Self::DataExport | Self::Security => 25,
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::DataAccess => "data_access",
            Self::DataModification => "data_modification",
            Self::DataExport => "data_export",
            Self::Configuration => "configuration",
            Self::KeyManagement => "key_management",
            Self::Administration => "administration",
            Self::Security => "security",
            Self::System => "system",
        };
        f.write_str(s)
    }
}

/// Sensitivity of the data an event touched.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DataClassification {
    /// Published or non-sensitive.
    Public,
    /// Internal business data.
    #[default]
    Internal,
    /// Client-identifying or financial data.
    Confidential,
    /// Health, session notes and other special-category data.
    Restricted,
}

impl DataClassification {
    /// Risk points contributed by the classification.
    #[must_use]
    pub const fn risk_weight(&self) -> u8 {
        match self {
            Self::Public => 0,
            Self::Internal => 5,
            Self::Confidential => 15,
            Self::Restricted => 25,
        }
    }
}

/// Whether the audited action succeeded.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Completed as requested.
    #[default]
    Success,
    /// Failed or was refused.
    Failure,
}

impl Outcome {
    /// Whether this is a failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_are_ordered_by_sensitivity() {
        assert!(DataClassification::Restricted.risk_weight() > DataClassification::Confidential.risk_weight());
        assert!(EventCategory::DataExport.risk_weight() > EventCategory::DataAccess.risk_weight());
        assert_eq!(EventCategory::System.risk_weight(), 0);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&EventCategory::DataExport).unwrap(),
            "\"data_export\""
        );
        assert_eq!(EventCategory::KeyManagement.to_string(), "key_management");
        assert_eq!(
            serde_json::to_string(&Outcome::Failure).unwrap(),
            "\"failure\""
        );
    }
}
