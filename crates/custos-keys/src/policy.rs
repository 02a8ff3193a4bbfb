//! Rotation policies, one per key purpose.

use std::collections::BTreeMap;

use custos_core::{KeyPurpose, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::{KeyError, KeyResult};

/// How keys of one purpose are rotated and retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationPolicy {
    /// Purpose governed by this policy.
    pub purpose: KeyPurpose,
    /// Days after creation at which a key becomes due for rotation.
    pub rotation_interval_days: u32,
    /// Days after creation beyond which a key is reported as overdue.
    pub max_key_age_days: u32,
    /// Rotation needs an explicit approver.
    pub requires_approval: bool,
    /// The scheduler rotates due keys without operator action.
    pub auto_rotate: bool,
    /// Days before expiry at which the scheduler starts warning.
    pub notify_before_days: u32,
    /// Days a retired key is kept for decryption before its material is purged.
    pub retention_period_days: u32,
}

impl RotationPolicy {
    /// The built-in policy for `purpose`.
    #[must_use]
    pub fn default_for(purpose: KeyPurpose) -> Self {
        match purpose {
            KeyPurpose::Data => Self {
                purpose,
                rotation_interval_days: 90,
                max_key_age_days: 365,
                requires_approval: false,
                auto_rotate: true,
                notify_before_days: 14,
                retention_period_days: 365,
            },
            KeyPurpose::Backup => Self {
                purpose,
                rotation_interval_days: 180,
                max_key_age_days: 730,
                requires_approval: true,
                auto_rotate: false,
                notify_before_days: 30,
                retention_period_days: 730,
            },
            KeyPurpose::Transit => Self {
                purpose,
                rotation_interval_days: 30,
                max_key_age_days: 90,
                requires_approval: false,
                auto_rotate: true,
                notify_before_days: 7,
                retention_period_days: 30,
            },
        }
    }

    /// When a key created at `created_at` falls due under this policy.
    #[must_use]
    pub fn rotation_due_at(&self, created_at: Timestamp) -> Timestamp {
        created_at.plus_days(self.rotation_interval_days)
    }

    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidPolicy`] if `max_key_age_days` is below the
    /// rotation interval.
    pub fn validate(&self) -> KeyResult<()> {
        if self.max_key_age_days < self.rotation_interval_days {
            return Err(KeyError::InvalidPolicy(format!(
                "{}: max_key_age_days ({}) must be >= rotation_interval_days ({})",
                self.purpose, self.max_key_age_days, self.rotation_interval_days
            )));
        }
        Ok(())
    }
}

/// A complete set of policies: exactly one per purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySet(BTreeMap<KeyPurpose, RotationPolicy>);

impl Default for PolicySet {
    fn default() -> Self {
        Self(
            KeyPurpose::ALL
                .into_iter()
                .map(|p| (p, RotationPolicy::default_for(p)))
                .collect(),
        )
    }
}

impl PolicySet {
    /// Start from the defaults and override with `policies`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidPolicy`] if any policy fails validation.
    pub fn from_policies(policies: impl IntoIterator<Item = RotationPolicy>) -> KeyResult<Self> {
        let mut set = Self::default();
        for policy in policies {
            set.set(policy)?;
        }
        Ok(set)
    }

    /// The policy for `purpose`.
    #[must_use]
    pub fn get(&self, purpose: KeyPurpose) -> RotationPolicy {
        self.0
            .get(&purpose)
            .cloned()
            .unwrap_or_else(|| RotationPolicy::default_for(purpose))
    }

    /// Replace the policy for its purpose.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidPolicy`] if the policy fails validation.
    pub fn set(&mut self, policy: RotationPolicy) -> KeyResult<()> {
        policy.validate()?;
        self.0.insert(policy.purpose, policy);
        Ok(())
    }

    /// Validate every policy.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub fn validate(&self) -> KeyResult<()> {
        self.0.values().try_for_each(RotationPolicy::validate)
    }

    /// Iterate policies in purpose order.
    pub fn iter(&self) -> impl Iterator<Item = &RotationPolicy> {
        self.0.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let set = PolicySet::default();
        assert!(set.validate().is_ok());
        assert_eq!(set.iter().count(), 3);
        assert!(set.get(KeyPurpose::Backup).requires_approval);
        assert!(!set.get(KeyPurpose::Backup).auto_rotate);
        assert_eq!(set.get(KeyPurpose::Transit).rotation_interval_days, 30);
    }

    #[test]
    fn test_max_age_below_interval_rejected() {
        let mut policy = RotationPolicy::default_for(KeyPurpose::Data);
        policy.max_key_age_days = 10;
        assert!(matches!(policy.validate(), Err(KeyError::InvalidPolicy(_))));
        assert!(PolicySet::default().set(policy).is_err());
    }

    #[test]
    fn test_zero_interval_allowed() {
        let mut policy = RotationPolicy::default_for(KeyPurpose::Data);
        policy.rotation_interval_days = 0;
        let set = PolicySet::from_policies([policy]).unwrap();
        assert_eq!(set.get(KeyPurpose::Data).rotation_interval_days, 0);
    }
}
