//! Conversion from configuration sections to domain types.
//!
//! `custos-config` has no dependency on the domain crates, so its sections
//! mirror the domain types field by field. The conversions live here.

use custos_audit::{HourRange, LedgerSettings, ScoringConfig, ThreatConfig};
use custos_config::{
    LoggingSection, PoliciesSection, PolicySection, ScoringSection, SecretSection, SecretsSection,
};
use custos_core::KeyPurpose;
use custos_crypto::SecretBootstrap;
use custos_keys::{KeyResult, PolicySet, RotationPolicy};
use custos_telemetry::{FileLogConfig, FileRotation, LogConfig, LogFormat, LogTarget, TelemetryResult};

/// Scoring weights and thresholds.
#[must_use]
pub fn scoring_config(section: &ScoringSection) -> ScoringConfig {
    ScoringConfig {
        off_hours_weight: section.off_hours_weight,
        unseen_action_weight: section.unseen_action_weight,
        unseen_origin_weight: section.unseen_origin_weight,
        unseen_user_agent_weight: section.unseen_user_agent_weight,
        warmup_events: section.warmup_events,
        default_normal_hours: HourRange::new(section.default_hours_start, section.default_hours_end),
        normal_hours_coverage_percent: section.normal_hours_coverage_percent,
        phi_weight: section.phi_weight,
        failure_weight: section.failure_weight,
        anomaly_risk_share_percent: section.anomaly_risk_share_percent,
        risk_alert_threshold: section.risk_alert_threshold,
        anomaly_alert_threshold: section.anomaly_alert_threshold,
        max_known_origins: section.max_known_origins,
        max_known_user_agents: section.max_known_user_agents,
        max_typical_actions: section.max_typical_actions,
    }
}

/// Threat detection rules.
#[must_use]
pub fn threat_config(section: &ScoringSection) -> ThreatConfig {
    ThreatConfig {
        auth_failure_threshold: section.auth_failure_threshold,
        auth_failure_window_minutes: section.auth_failure_window_minutes,
        bulk_export_threshold: section.bulk_export_threshold,
        privilege_escalation_actions: section.privilege_escalation_actions.clone(),
    }
}

/// Scoring plus threat rules, as the ledger takes them.
#[must_use]
pub fn ledger_settings(section: &ScoringSection) -> LedgerSettings {
    LedgerSettings {
        scoring: scoring_config(section),
        threats: threat_config(section),
    }
}

fn rotation_policy(purpose: KeyPurpose, section: &PolicySection) -> RotationPolicy {
    RotationPolicy {
        purpose,
        rotation_interval_days: section.rotation_interval_days,
        max_key_age_days: section.max_key_age_days,
        requires_approval: section.requires_approval,
        auto_rotate: section.auto_rotate,
        notify_before_days: section.notify_before_days,
        retention_period_days: section.retention_period_days,
    }
}

/// One rotation policy per purpose.
///
/// # Errors
///
/// Returns [`KeyError::InvalidPolicy`](custos_keys::KeyError::InvalidPolicy)
/// if a policy is inconsistent.
pub fn policy_set(section: &PoliciesSection) -> KeyResult<PolicySet> {
    PolicySet::from_policies([
        rotation_policy(KeyPurpose::Data, &section.data),
        rotation_policy(KeyPurpose::Backup, &section.backup),
        rotation_policy(KeyPurpose::Transit, &section.transit),
    ])
}

/// Log settings.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidSetting`](custos_telemetry::TelemetryError::InvalidSetting)
/// for an unknown format or rotation name.
pub fn log_config(section: &LoggingSection) -> TelemetryResult<LogConfig> {
    let format: LogFormat = section.format.parse()?;
    let rotation: FileRotation = section.rotation.parse()?;
    let target = match (section.target.as_str(), &section.directory) {
        ("stdout", _) => LogTarget::Stdout,
        ("file", Some(dir)) => LogTarget::File(dir.clone()),
        _ => LogTarget::Stderr,
    };
    let ansi = !matches!(target, LogTarget::File(_));

    Ok(LogConfig {
        level: section.level.to_lowercase(),
        format,
        target,
        file: FileLogConfig {
            prefix: section.file_prefix.clone(),
            rotation,
            ..FileLogConfig::default()
        },
        ansi,
        directives: section.directives.clone(),
        ..LogConfig::default()
    })
}

/// How to resolve one secret.
///
/// The passphrase is looked up through `lookup` under the variable named by
/// `secrets.passphrase_env`; it never appears in configuration.
pub fn secret_bootstrap<F>(
    name: &str,
    secret: &SecretSection,
    secrets: &SecretsSection,
    lookup: F,
) -> SecretBootstrap
where
    F: Fn(&str) -> Option<String>,
{
    let mut bootstrap = SecretBootstrap::new(name)
        .env_var(secret.env_var.clone())
        .iterations(secrets.pbkdf2_iterations);
    if let Some(path) = &secret.key_file {
        bootstrap = bootstrap.key_file(path.clone());
    }
    if let Some(passphrase) = lookup(&secrets.passphrase_env).filter(|p| !p.is_empty()) {
        bootstrap = bootstrap.passphrase(passphrase);
    }
    bootstrap
}

#[cfg(test)]
mod tests {
    use super::*;
    use custos_config::Config;
    use std::path::PathBuf;

    #[test]
    fn test_default_scoring_matches_domain_default() {
        let config = Config::default();
        assert_eq!(scoring_config(&config.scoring), ScoringConfig::default());
        assert_eq!(threat_config(&config.scoring), ThreatConfig::default());
    }

    #[test]
    fn test_default_policies_match_domain_default() {
        let set = policy_set(&Config::default().policies).unwrap();
        for purpose in KeyPurpose::ALL {
            assert_eq!(set.get(purpose), RotationPolicy::default_for(purpose));
        }
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let mut policies = Config::default().policies;
        policies.data.max_key_age_days = 1;
        assert!(policy_set(&policies).is_err());
    }

    #[test]
    fn test_log_config_file_target() {
        let mut logging = Config::default().logging;
        logging.target = "file".into();
        logging.directory = Some(PathBuf::from("/var/log/custos"));
        logging.format = "json".into();
        logging.rotation = "hourly".into();

        let log = log_config(&logging).unwrap();
        assert_eq!(log.target, LogTarget::File(PathBuf::from("/var/log/custos")));
        assert_eq!(log.format, LogFormat::Json);
        assert_eq!(log.file.rotation, FileRotation::Hourly);
        assert!(!log.ansi);
    }

    #[test]
    fn test_log_config_rejects_unknown_format() {
        let mut logging = Config::default().logging;
        logging.format = "xml".into();
        assert!(log_config(&logging).is_err());
    }

    #[test]
    fn test_secret_bootstrap_reads_passphrase_by_name() {
        let secrets = Config::default().secrets;
        let bootstrap = secret_bootstrap("signing key", &secrets.signing_key, &secrets, |var| {
            (var == "CUSTOS_SECRETS_PASSPHRASE").then(|| "correct horse battery".to_owned())
        });
        assert!(format!("{bootstrap:?}").contains("has_passphrase: true"));

        let bootstrap = secret_bootstrap("kek", &secrets.kek, &secrets, |_| None);
        assert!(format!("{bootstrap:?}").contains("has_passphrase: false"));
    }
}
