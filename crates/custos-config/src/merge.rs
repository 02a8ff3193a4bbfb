//! Layer-by-layer merging of raw TOML trees.
//!
//! Merging happens before deserialization so that a key an overlay leaves
//! out keeps the value from the layer below.

use std::collections::HashMap;
use std::fmt;

/// Origin of a resolved value, weakest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLayer {
    /// `defaults.toml` compiled into the binary.
    Defaults,
    /// `/etc/custos/config.toml`.
    System,
    /// `~/.custos/config.toml`.
    User,
    /// A file named by the caller.
    File,
    /// A `CUSTOS_*` variable filling an unset field.
    Environment,
}

impl fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Defaults => "defaults",
            Self::System => "system",
            Self::User => "user",
            Self::File => "file",
            Self::Environment => "env",
        })
    }
}

/// Dotted leaf path to the layer that last wrote it.
pub type FieldSources = HashMap<String, ConfigLayer>;

fn child_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        return key.to_owned();
    }
    format!("{prefix}.{key}")
}

/// Fold `overlay` into `base` and record `layer` for every leaf it writes.
///
/// Tables recurse. Anything else, arrays included, replaces wholesale.
pub fn deep_merge_tracking(
    base: &mut toml::Value,
    overlay: &toml::Value,
    prefix: &str,
    layer: &ConfigLayer,
    sources: &mut FieldSources,
) {
    if !(base.is_table() && overlay.is_table()) {
        *base = overlay.clone();
        sources.insert(prefix.to_owned(), layer.clone());
        return;
    }
    let (Some(into), Some(from)) = (base.as_table_mut(), overlay.as_table()) else {
        return;
    };
    for (key, incoming) in from {
        let path = child_path(prefix, key);
        match into.get_mut(key) {
            Some(existing) if incoming.is_table() => {
                deep_merge_tracking(existing, incoming, &path, layer, sources);
            },
            Some(existing) => {
                *existing = incoming.clone();
                sources.insert(path, layer.clone());
            },
            None => {
                into.insert(key.clone(), incoming.clone());
                record_leaves(incoming, &path, layer, sources);
            },
        }
    }
}

/// Attribute every leaf under `value` to `layer`.
pub fn record_leaves(value: &toml::Value, prefix: &str, layer: &ConfigLayer, sources: &mut FieldSources) {
    match value.as_table() {
        Some(table) => {
            for (key, child) in table {
                record_leaves(child, &child_path(prefix, key), layer, sources);
            }
        },
        None => {
            sources.insert(prefix.to_owned(), layer.clone());
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> toml::Value {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn test_overlay_replaces_leaves_only() {
        let mut base = parse(
            r#"
            [scheduler]
            enabled = true
            rotation_interval_secs = 3600
            "#,
        );
        let overlay = parse("[scheduler]\nrotation_interval_secs = 60");
        let mut sources = FieldSources::new();
        deep_merge_tracking(&mut base, &overlay, "", &ConfigLayer::User, &mut sources);

        assert_eq!(base["scheduler"]["rotation_interval_secs"].as_integer(), Some(60));
        assert_eq!(base["scheduler"]["enabled"].as_bool(), Some(true));
        assert_eq!(
            sources.get("scheduler.rotation_interval_secs"),
            Some(&ConfigLayer::User)
        );
        assert!(!sources.contains_key("scheduler.enabled"));
    }

    #[test]
    fn test_new_tables_recorded() {
        let mut base = parse("[logging]\nlevel = \"info\"");
        let overlay = parse("[ledger]\npath = \"/var/lib/custos\"");
        let mut sources = FieldSources::new();
        deep_merge_tracking(&mut base, &overlay, "", &ConfigLayer::File, &mut sources);
        assert_eq!(sources.get("ledger.path"), Some(&ConfigLayer::File));
    }

    #[test]
    fn test_arrays_replace() {
        let mut base = parse("[scoring]\nprivilege_escalation_actions = [\"a\", \"b\"]");
        let overlay = parse("[scoring]\nprivilege_escalation_actions = [\"c\"]");
        let mut sources = FieldSources::new();
        deep_merge_tracking(&mut base, &overlay, "", &ConfigLayer::System, &mut sources);
        assert_eq!(
            base["scoring"]["privilege_escalation_actions"]
                .as_array()
                .map(Vec::len),
            Some(1)
        );
    }
}
