//! Configuration types for Custos.
//!
//! All types in this module are self-contained with no dependencies on other
//! internal custos crates. Domain types (scoring weights, rotation policies,
//! log settings) are mirrored here and converted at the integration boundary
//! in `custos-runtime`. Every struct implements [`Default`] with the same
//! values as the embedded `defaults.toml`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Audit ledger storage.
    pub ledger: LedgerSection,
    /// Anomaly, risk and threat scoring.
    pub scoring: ScoringSection,
    /// Key store and export settings.
    pub keys: KeysSection,
    /// Rotation policy per key purpose.
    pub policies: PoliciesSection,
    /// Background task intervals.
    pub scheduler: SchedulerSection,
    /// Where the signing key and key-encryption key come from.
    pub secrets: SecretsSection,
    /// Log level, format and destination.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Audit ledger storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    /// Database directory. `None` keeps the ledger in memory.
    pub path: Option<PathBuf>,
    /// Persist behavioral baselines next to the entries.
    pub persist_baselines: bool,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            path: None,
            persist_baselines: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Scoring weights, alert thresholds and threat rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSection {
    /// Points for activity outside normal hours.
    pub off_hours_weight: u8,
    /// Points for an action the actor has not performed before.
    pub unseen_action_weight: u8,
    /// Points for an unknown network origin.
    pub unseen_origin_weight: u8,
    /// Points for an unknown user agent.
    pub unseen_user_agent_weight: u8,
    /// Events before learned hours replace the defaults.
    pub warmup_events: u64,
    /// First normal hour (UTC) until a baseline is warm.
    pub default_hours_start: u8,
    /// Last normal hour (UTC, inclusive) until a baseline is warm.
    pub default_hours_end: u8,
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
    /// Known origins kept per actor.
    pub max_known_origins: usize,
    /// Known user agents kept per actor.
    pub max_known_user_agents: usize,
    /// Typical actions kept per actor.
    pub max_typical_actions: usize,
    /// Failed authentications that count as an attack.
    pub auth_failure_threshold: u32,
    /// Window for counting failed authentications.
    pub auth_failure_window_minutes: u32,
    /// Exported records that count as bulk.
    pub bulk_export_threshold: u64,
    /// Actions treated as privilege escalation.
    pub privilege_escalation_actions: Vec<String>,
}

impl Default for ScoringSection {
    fn default() -> Self {
        Self {
            off_hours_weight: 30,
            unseen_action_weight: 20,
            unseen_origin_weight: 25,
            unseen_user_agent_weight: 10,
            warmup_events: 10,
            default_hours_start: 8,
            default_hours_end: 19,
            normal_hours_coverage_percent: 90,
            phi_weight: 20,
            failure_weight: 15,
            anomaly_risk_share_percent: 30,
            risk_alert_threshold: 70,
            anomaly_alert_threshold: 25,
            max_known_origins: 64,
            max_known_user_agents: 32,
            max_typical_actions: 256,
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
            .map(str::to_owned)
            .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Keys & policies
// ---------------------------------------------------------------------------

/// Key store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysSection {
    /// Database directory. `None` keeps keys in memory.
    pub path: Option<PathBuf>,
    /// PBKDF2 iterations for password-protected key exports.
    pub export_iterations: u32,
}

impl Default for KeysSection {
    fn default() -> Self {
        Self {
            path: None,
            export_iterations: 210_000,
        }
    }
}

/// Rotation policy for one purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySection {
    /// Days between rotations.
    pub rotation_interval_days: u32,
    /// Hard ceiling on key age.
    pub max_key_age_days: u32,
    /// Rotation needs a named approver.
    pub requires_approval: bool,
    /// The scheduler rotates due keys.
    pub auto_rotate: bool,
    /// Days before expiry to start reporting.
    pub notify_before_days: u32,
    /// Days a retired key is kept before its material is purged.
    pub retention_period_days: u32,
}

/// Rotation policies, one per key purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoliciesSection {
    /// Data-at-rest keys.
    pub data: PolicySection,
    /// Backup keys.
    pub backup: PolicySection,
    /// Transit keys.
    pub transit: PolicySection,
}

impl Default for PoliciesSection {
    fn default() -> Self {
        Self {
            data: PolicySection {
                rotation_interval_days: 90,
                max_key_age_days: 365,
                requires_approval: false,
                auto_rotate: true,
                notify_before_days: 14,
                retention_period_days: 365,
            },
            backup: PolicySection {
                rotation_interval_days: 180,
                max_key_age_days: 730,
                requires_approval: true,
                auto_rotate: false,
                notify_before_days: 30,
                retention_period_days: 730,
            },
            transit: PolicySection {
                rotation_interval_days: 30,
                max_key_age_days: 90,
                requires_approval: false,
                auto_rotate: true,
                notify_before_days: 7,
                retention_period_days: 30,
            },
        }
    }
}

impl PoliciesSection {
    /// Policies with their purpose names.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &PolicySection)> {
        [
            ("data", &self.data),
            ("backup", &self.backup),
            ("transit", &self.transit),
        ]
        .into_iter()
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Background task settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// Run background tasks at all.
    pub enabled: bool,
    /// Seconds between rotation sweeps.
    pub rotation_interval_secs: u64,
    /// Seconds between integrity sweeps (0 disables them).
    pub integrity_interval_secs: u64,
    /// Most recent entries checked by each integrity sweep.
    pub integrity_window: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            enabled: true,
            rotation_interval_secs: 3600,
            integrity_interval_secs: 86_400,
            integrity_window: 10_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// Bootstrap sources for one secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretSection {
    /// Environment variable holding the hex-encoded secret.
    pub env_var: String,
    /// Encrypted key file, created on first start.
    pub key_file: Option<PathBuf>,
}

/// Where the ledger signing key and the key-encryption key come from.
///
/// Passphrases are never stored in configuration; only the name of the
/// environment variable that holds one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsSection {
    /// Ledger signing key.
    pub signing_key: SecretSection,
    /// Key-encryption key for the key store.
    pub kek: SecretSection,
    /// Environment variable holding the key file passphrase.
    pub passphrase_env: String,
    /// PBKDF2 iterations for key file wrapping.
    pub pbkdf2_iterations: u32,
}

impl Default for SecretsSection {
    fn default() -> Self {
        Self {
            signing_key: SecretSection {
                env_var: "CUSTOS_SIGNING_KEY".to_owned(),
                key_file: None,
            },
            kek: SecretSection {
                env_var: "CUSTOS_KEK".to_owned(),
                key_file: None,
            },
            passphrase_env: "CUSTOS_SECRETS_PASSPHRASE".to_owned(),
            pbkdf2_iterations: 210_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Log settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Output format (`pretty`, `compact`, `json`).
    pub format: String,
    /// Destination (`stdout`, `stderr`, `file`).
    pub target: String,
    /// Extra `EnvFilter` directives (`custos_audit=debug`).
    pub directives: Vec<String>,
    /// Log directory when `target = "file"`.
    pub directory: Option<PathBuf>,
    /// File name prefix.
    pub file_prefix: String,
    /// File rotation (`never`, `hourly`, `daily`).
    pub rotation: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            target: "stderr".to_owned(),
            directives: Vec::new(),
            directory: None,
            file_prefix: "custos".to_owned(),
            rotation: "daily".to_owned(),
        }
    }
}
