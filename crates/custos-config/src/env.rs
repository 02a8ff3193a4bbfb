//! Environment variable fallbacks.
//!
//! Env vars are **fallback**, not override: they only apply to fields that
//! no config file set. Secrets themselves are never read here; the secret
//! sections only name the variables `custos-crypto` reads at bootstrap.

use std::collections::HashMap;

use tracing::debug;

use crate::merge::{ConfigLayer, FieldSources};

/// How a variable's text is turned into a TOML value.
#[derive(Debug, Clone, Copy)]
enum Kind {
    Str,
    Int,
    Bool,
}

/// `(variable, dotted field, kind)`.
const FALLBACKS: &[(&str, &str, Kind)] = &[
    ("CUSTOS_LOG_LEVEL", "logging.level", Kind::Str),
    ("CUSTOS_LOG_FORMAT", "logging.format", Kind::Str),
    ("CUSTOS_LOG_TARGET", "logging.target", Kind::Str),
    ("CUSTOS_LOG_DIR", "logging.directory", Kind::Str),
    ("CUSTOS_LEDGER_PATH", "ledger.path", Kind::Str),
    ("CUSTOS_KEYS_PATH", "keys.path", Kind::Str),
    ("CUSTOS_SIGNING_KEY_FILE", "secrets.signing_key.key_file", Kind::Str),
    ("CUSTOS_KEK_FILE", "secrets.kek.key_file", Kind::Str),
    ("CUSTOS_SCHEDULER_ENABLED", "scheduler.enabled", Kind::Bool),
    ("CUSTOS_ROTATION_INTERVAL_SECS", "scheduler.rotation_interval_secs", Kind::Int),
    ("CUSTOS_INTEGRITY_INTERVAL_SECS", "scheduler.integrity_interval_secs", Kind::Int),
    ("CUSTOS_RISK_ALERT_THRESHOLD", "scoring.risk_alert_threshold", Kind::Int),
    ("CUSTOS_ANOMALY_ALERT_THRESHOLD", "scoring.anomaly_alert_threshold", Kind::Int),
];

/// Fill fields that only the defaults set from `env`.
///
/// Returns how many variables were used. A value that does not parse as its
/// kind is inserted as a string so deserialization reports it.
pub fn apply_env_fallbacks<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env: &HashMap<String, String, S>,
) -> usize {
    let mut applied: usize = 0;
    for &(var, field, kind) in FALLBACKS {
        if sources
            .get(field)
            .is_some_and(|layer| *layer != ConfigLayer::Defaults)
        {
            continue;
        }
        let Some(raw) = env.get(var) else {
            continue;
        };
        debug!(var, field, "env fallback");
        insert_at(merged, field, coerce(kind, raw));
        sources.insert(field.to_owned(), ConfigLayer::Environment);
        applied = applied.saturating_add(1);
    }
    applied
}

fn coerce(kind: Kind, raw: &str) -> toml::Value {
    let trimmed = raw.trim();
    let typed = match kind {
        Kind::Str => None,
        Kind::Int => trimmed.parse().ok().map(toml::Value::Integer),
        Kind::Bool => trimmed.parse().ok().map(toml::Value::Boolean),
    };
    typed.unwrap_or_else(|| toml::Value::String(raw.to_owned()))
}

/// Insert at a dotted path, creating missing tables. A non-table in the way
/// leaves the tree unchanged.
fn insert_at(root: &mut toml::Value, path: &str, value: toml::Value) {
    let Some((parents, leaf)) = path.rsplit_once('.') else {
        if let Some(table) = root.as_table_mut() {
            table.insert(path.to_owned(), value);
        }
        return;
    };
    let mut node = root;
    for part in parents.split('.') {
        let Some(table) = node.as_table_mut() else {
            return;
        };
        node = table
            .entry(part)
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
    }
    if let Some(table) = node.as_table_mut() {
        table.insert(leaf.to_owned(), value);
    }
}

/// Snapshot of the process environment.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_env_applies_over_defaults() {
        let mut merged: toml::Value = toml::from_str("[logging]\nlevel = \"info\"").unwrap();
        let mut sources = FieldSources::new();
        sources.insert("logging.level".to_owned(), ConfigLayer::Defaults);
        let env = vars(&[("CUSTOS_LOG_LEVEL", "debug")]);

        assert_eq!(apply_env_fallbacks(&mut merged, &mut sources, &env), 1);
        assert_eq!(merged["logging"]["level"].as_str(), Some("debug"));
        assert_eq!(
            sources.get("logging.level"),
            Some(&ConfigLayer::Environment)
        );
    }

    #[test]
    fn test_env_skips_file_values() {
        let mut merged: toml::Value = toml::from_str("[logging]\nlevel = \"warn\"").unwrap();
        let mut sources = FieldSources::new();
        sources.insert("logging.level".to_owned(), ConfigLayer::User);
        let env = vars(&[("CUSTOS_LOG_LEVEL", "debug")]);

        assert_eq!(apply_env_fallbacks(&mut merged, &mut sources, &env), 0);
        assert_eq!(merged["logging"]["level"].as_str(), Some("warn"));
    }

    #[test]
    fn test_env_coerces_types_and_creates_tables() {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        let mut sources = FieldSources::new();
        let env = vars(&[
            ("CUSTOS_ROTATION_INTERVAL_SECS", "120"),
            ("CUSTOS_SCHEDULER_ENABLED", "false"),
            ("CUSTOS_KEK_FILE", "/var/lib/custos/kek.json"),
        ]);

        assert_eq!(apply_env_fallbacks(&mut merged, &mut sources, &env), 3);
        assert_eq!(
            merged["scheduler"]["rotation_interval_secs"].as_integer(),
            Some(120)
        );
        assert_eq!(merged["scheduler"]["enabled"].as_bool(), Some(false));
        assert_eq!(
            merged["secrets"]["kek"]["key_file"].as_str(),
            Some("/var/lib/custos/kek.json")
        );
    }

    #[test]
    fn test_coercion_falls_back_to_text() {
        assert!(coerce(Kind::Int, "soon").is_str());
        assert_eq!(coerce(Kind::Int, " 7 ").as_integer(), Some(7));
        assert_eq!(coerce(Kind::Bool, "true").as_bool(), Some(true));
        assert_eq!(coerce(Kind::Str, " padded ").as_str(), Some(" padded "));
    }

    #[test]
    fn test_insert_stops_at_a_scalar() {
        let mut root: toml::Value = toml::from_str("logging = 3").unwrap();
        insert_at(&mut root, "logging.level", toml::Value::String("debug".into()));
        assert_eq!(root["logging"].as_integer(), Some(3));
    }
}
