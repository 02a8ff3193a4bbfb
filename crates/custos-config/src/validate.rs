//! Post-merge configuration validation.
//!
//! Validates that deserialized [`Config`](crate::Config) values are within
//! acceptable ranges and that cross-field invariants hold.

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Config, PolicySection};

/// Lowest PBKDF2 iteration count accepted for key files and exports.
pub const MIN_PBKDF2_ITERATIONS: u32 = 100_000;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_scoring(config)?;
    validate_keys(config)?;
    validate_policies(config)?;
    validate_scheduler(config)?;
    validate_secrets(config)?;
    validate_logging(config)?;
    Ok(())
}

fn percent(field: &str, value: u8) -> ConfigResult<()> {
    if value > 100 {
        return Err(ConfigError::invalid(
            field,
            format!("{value} is out of range; must be between 0 and 100"),
        ));
    }
    Ok(())
}

fn hour(field: &str, value: u8) -> ConfigResult<()> {
    if value > 23 {
        return Err(ConfigError::invalid(
            field,
            format!("hour {value} is out of range; must be between 0 and 23"),
        ));
    }
    Ok(())
}

fn validate_scoring(config: &Config) -> ConfigResult<()> {
    let s = &config.scoring;

    percent("scoring.risk_alert_threshold", s.risk_alert_threshold)?;
    percent("scoring.anomaly_alert_threshold", s.anomaly_alert_threshold)?;
    percent("scoring.anomaly_risk_share_percent", s.anomaly_risk_share_percent)?;
    percent(
        "scoring.normal_hours_coverage_percent",
        s.normal_hours_coverage_percent,
    )?;
    if s.normal_hours_coverage_percent == 0 {
        return Err(ConfigError::invalid(
            "scoring.normal_hours_coverage_percent",
            "coverage must be at least 1",
        ));
    }
    hour("scoring.default_hours_start", s.default_hours_start)?;
    hour("scoring.default_hours_end", s.default_hours_end)?;

    if s.warmup_events == 0 {
        return Err(ConfigError::invalid(
            "scoring.warmup_events",
            "warmup_events must be at least 1",
        ));
    }
    for (field, cap) in [
        ("scoring.max_known_origins", s.max_known_origins),
        ("scoring.max_known_user_agents", s.max_known_user_agents),
        ("scoring.max_typical_actions", s.max_typical_actions),
    ] {
        if cap == 0 {
            return Err(ConfigError::invalid(field, "baseline caps must be at least 1"));
        }
    }
    if s.auth_failure_threshold == 0 || s.auth_failure_window_minutes == 0 {
        return Err(ConfigError::invalid(
            "scoring.auth_failure_threshold",
            "auth failure threshold and window must both be at least 1",
        ));
    }
    if s.bulk_export_threshold == 0 {
        return Err(ConfigError::invalid(
            "scoring.bulk_export_threshold",
            "bulk_export_threshold must be at least 1",
        ));
    }
    if s.privilege_escalation_actions.iter().any(|a| a.trim().is_empty()) {
        return Err(ConfigError::invalid(
            "scoring.privilege_escalation_actions",
            "action names must not be empty",
        ));
    }
    Ok(())
}

fn validate_keys(config: &Config) -> ConfigResult<()> {
    if config.keys.export_iterations < MIN_PBKDF2_ITERATIONS {
        return Err(ConfigError::invalid(
            "keys.export_iterations",
            format!("must be at least {MIN_PBKDF2_ITERATIONS}"),
        ));
    }
    Ok(())
}

fn validate_policy(purpose: &str, policy: &PolicySection) -> ConfigResult<()> {
    if policy.max_key_age_days < policy.rotation_interval_days {
        return Err(ConfigError::invalid(
            &format!("policies.{purpose}.max_key_age_days"),
            format!(
                "max_key_age_days ({}) must be at least rotation_interval_days ({})",
                policy.max_key_age_days, policy.rotation_interval_days
            ),
        ));
    }
    Ok(())
}

fn validate_policies(config: &Config) -> ConfigResult<()> {
    for (purpose, policy) in config.policies.iter() {
        validate_policy(purpose, policy)?;
    }
    Ok(())
}

fn validate_scheduler(config: &Config) -> ConfigResult<()> {
    let s = &config.scheduler;
    if s.rotation_interval_secs == 0 {
        return Err(ConfigError::invalid(
            "scheduler.rotation_interval_secs",
            "rotation_interval_secs must be at least 1",
        ));
    }
    if s.integrity_interval_secs > 0 && s.integrity_window == 0 {
        return Err(ConfigError::invalid(
            "scheduler.integrity_window",
            "integrity_window must be at least 1 when integrity sweeps are enabled",
        ));
    }
    Ok(())
}

fn validate_secrets(config: &Config) -> ConfigResult<()> {
    let s = &config.secrets;
    for (field, name) in [
        ("secrets.signing_key.env_var", &s.signing_key.env_var),
        ("secrets.kek.env_var", &s.kek.env_var),
        ("secrets.passphrase_env", &s.passphrase_env),
    ] {
        if name.trim().is_empty() {
            return Err(ConfigError::invalid(field, "variable name must not be empty"));
        }
    }
    if s.signing_key.env_var == s.kek.env_var {
        return Err(ConfigError::invalid(
            "secrets.kek.env_var",
            "the signing key and the KEK must come from different variables",
        ));
    }
    if let (Some(a), Some(b)) = (&s.signing_key.key_file, &s.kek.key_file)
        && a == b
    {
        return Err(ConfigError::invalid(
            "secrets.kek.key_file",
            "the signing key and the KEK must use different key files",
        ));
    }
    if s.pbkdf2_iterations < MIN_PBKDF2_ITERATIONS {
        return Err(ConfigError::invalid(
            "secrets.pbkdf2_iterations",
            format!("must be at least {MIN_PBKDF2_ITERATIONS}"),
        ));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;

    if !matches!(
        l.level.to_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        return Err(ConfigError::invalid(
            "logging.level",
            format!(
                "invalid log level '{}'; expected one of: trace, debug, info, warn, error",
                l.level
            ),
        ));
    }
    if !matches!(l.format.as_str(), "pretty" | "compact" | "json") {
        return Err(ConfigError::invalid(
            "logging.format",
            format!(
                "invalid log format '{}'; expected one of: pretty, compact, json",
                l.format
            ),
        ));
    }
    if !matches!(l.target.as_str(), "stdout" | "stderr" | "file") {
        return Err(ConfigError::invalid(
            "logging.target",
            format!(
                "invalid log target '{}'; expected one of: stdout, stderr, file",
                l.target
            ),
        ));
    }
    if l.target == "file" && l.directory.is_none() {
        return Err(ConfigError::invalid(
            "logging.directory",
            "a directory is required when logging to a file",
        ));
    }
    if !matches!(l.rotation.as_str(), "never" | "hourly" | "daily") {
        return Err(ConfigError::invalid(
            "logging.rotation",
            format!(
                "invalid rotation '{}'; expected one of: never, hourly, daily",
                l.rotation
            ),
        ));
    }
    if l.directives.iter().any(|d| d.trim().is_empty()) {
        return Err(ConfigError::invalid(
            "logging.directives",
            "directives must not be empty strings",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn field_of(result: ConfigResult<()>) -> String {
        match result {
            Err(ConfigError::Invalid { field, .. }) => field,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_threshold_above_100() {
        let mut config = Config::default();
        config.scoring.risk_alert_threshold = 101;
        assert_eq!(field_of(validate(&config)), "scoring.risk_alert_threshold");
    }

    #[test]
    fn test_bad_hour() {
        let mut config = Config::default();
        config.scoring.default_hours_end = 24;
        assert_eq!(field_of(validate(&config)), "scoring.default_hours_end");
    }

    #[test]
    fn test_policy_max_age_below_interval() {
        let mut config = Config::default();
        config.policies.transit.max_key_age_days = 10;
        assert_eq!(
            field_of(validate(&config)),
            "policies.transit.max_key_age_days"
        );
    }

    #[test]
    fn test_weak_iterations() {
        let mut config = Config::default();
        config.keys.export_iterations = 1_000;
        assert_eq!(field_of(validate(&config)), "keys.export_iterations");
    }

    #[test]
    fn test_shared_secret_sources_rejected() {
        let mut config = Config::default();
        config.secrets.kek.env_var = config.secrets.signing_key.env_var.clone();
        assert_eq!(field_of(validate(&config)), "secrets.kek.env_var");

        let mut config = Config::default();
        config.secrets.signing_key.key_file = Some(PathBuf::from("/k"));
        config.secrets.kek.key_file = Some(PathBuf::from("/k"));
        assert_eq!(field_of(validate(&config)), "secrets.kek.key_file");
    }

    #[test]
    fn test_file_logging_needs_directory() {
        let mut config = Config::default();
        config.logging.target = "file".into();
        assert_eq!(field_of(validate(&config)), "logging.directory");
        config.logging.directory = Some(PathBuf::from("/var/log/custos"));
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_unknown_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".into();
        assert_eq!(field_of(validate(&config)), "logging.format");
    }

    #[test]
    fn test_zero_rotation_interval() {
        let mut config = Config::default();
        config.scheduler.rotation_interval_secs = 0;
        assert_eq!(
            field_of(validate(&config)),
            "scheduler.rotation_interval_secs"
        );
    }
}
