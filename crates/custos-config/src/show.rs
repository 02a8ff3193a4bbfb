//! Resolved configuration with per-field provenance.

use serde::Serialize;

use crate::merge::{ConfigLayer, FieldSources};
use crate::types::Config;

/// Output format for [`ResolvedConfig::render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShowFormat {
    /// TOML, the same shape as a config file.
    #[default]
    Toml,
    /// Pretty-printed JSON.
    Json,
}

/// A fully loaded configuration plus where each value came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The validated configuration.
    pub config: Config,
    /// Dotted field path to the layer that set it.
    pub field_sources: FieldSources,
    /// Config files that were found and merged, in load order.
    pub loaded_files: Vec<String>,
}

#[derive(Serialize)]
struct SourceLine<'a> {
    field: &'a str,
    source: String,
}

impl ResolvedConfig {
    /// Layer that set `field` (dotted path, e.g. `scheduler.enabled`).
    #[must_use]
    pub fn source_of(&self, field: &str) -> Option<&ConfigLayer> {
        self.field_sources.get(field)
    }

    /// Fields set by anything other than the embedded defaults, sorted.
    #[must_use]
    pub fn overridden_fields(&self) -> Vec<(&str, &ConfigLayer)> {
        let mut fields: Vec<_> = self
            .field_sources
            .iter()
            .filter(|(_, layer)| **layer != ConfigLayer::Defaults)
            .map(|(field, layer)| (field.as_str(), layer))
            .collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));
        fields
    }

    /// Render the effective configuration.
    ///
    /// The configuration holds no secret values, only variable names and
    /// file paths, so it is safe to print.
    ///
    /// # Errors
    ///
    /// Returns a description of the serialization failure.
    pub fn render(&self, format: ShowFormat) -> Result<String, String> {
        match format {
            ShowFormat::Toml => toml::to_string_pretty(&self.config).map_err(|e| e.to_string()),
            ShowFormat::Json => {
                let sources: Vec<SourceLine<'_>> = self
                    .overridden_fields()
                    .into_iter()
                    .map(|(field, layer)| SourceLine {
                        field,
                        source: layer.to_string(),
                    })
                    .collect();
                serde_json::to_string_pretty(&serde_json::json!({
                    "config": self.config,
                    "overrides": sources,
                    "loaded_files": self.loaded_files,
                }))
                .map_err(|e| e.to_string())
            },
        }
    }
}
