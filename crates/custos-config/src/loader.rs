//! Discovering config files and folding them into one [`Config`].
//!
//! Layers, lowest first: embedded `defaults.toml`, the system file, the user
//! file, then an explicit file. Environment variables only fill leaves that
//! no file set. The merged tree is deserialized and validated last.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_fallbacks, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge_tracking, record_leaves};
use crate::show::ResolvedConfig;
use crate::types::Config;
use crate::validate;

const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Files above this size are refused unparsed.
const SIZE_LIMIT: u64 = 1024 * 1024;

const SYSTEM_FILE: &str = "/etc/custos/config.toml";

/// Inputs to [`load`]. The default discovers everything from the process.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Extra file merged last, above the user layer. Must exist.
    pub config_file: Option<PathBuf>,
    /// Directory used instead of `~/.custos` for the user layer.
    pub home_dir: Option<PathBuf>,
    /// System config path. `None` uses `/etc/custos/config.toml`.
    pub system_file: Option<PathBuf>,
    /// Environment to read fallbacks from. `None` reads the process env.
    pub env: Option<HashMap<String, String>>,
}

impl LoadOptions {
    /// Options that load `path` on top of the standard layers.
    #[must_use]
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        Self {
            config_file: Some(path.into()),
            ..Self::default()
        }
    }

    fn user_file(&self) -> ConfigResult<PathBuf> {
        let dir = match &self.home_dir {
            Some(dir) => dir.clone(),
            None => directories::BaseDirs::new()
                .ok_or(ConfigError::HomeUnknown)?
                .home_dir()
                .join(".custos"),
        };
        Ok(dir.join("config.toml"))
    }
}

/// Merged TOML tree plus the bookkeeping of where each leaf came from.
struct Layering {
    tree: toml::Value,
    sources: FieldSources,
    files: Vec<String>,
}

impl Layering {
    fn from_defaults() -> ConfigResult<Self> {
        let tree = toml::from_str(DEFAULTS_TOML)
            .map_err(|e| ConfigError::parse("<embedded defaults>", e))?;
        let mut sources = FieldSources::new();
        record_leaves(&tree, "", &ConfigLayer::Defaults, &mut sources);
        Ok(Self {
            tree,
            sources,
            files: Vec::new(),
        })
    }

    /// Merge `path` if present. Returns whether it was.
    fn overlay(&mut self, path: &Path, layer: &ConfigLayer) -> ConfigResult<bool> {
        let Some(value) = read_toml(path)? else {
            return Ok(false);
        };
        deep_merge_tracking(&mut self.tree, &value, "", layer, &mut self.sources);
        self.files.push(path.display().to_string());
        info!(path = %path.display(), %layer, "config layer merged");
        Ok(true)
    }

    fn finish(self, origin: &str) -> ConfigResult<ResolvedConfig> {
        let config: Config = self
            .tree
            .try_into()
            .map_err(|e| ConfigError::parse(origin, e))?;
        validate::validate(&config)?;
        Ok(ResolvedConfig {
            config,
            field_sources: self.sources,
            loaded_files: self.files,
        })
    }
}

/// Load the configuration through every layer.
///
/// # Errors
///
/// Fails if an explicit file is missing, any file is unreadable, oversized or
/// malformed, or the merged result does not validate.
pub fn load(options: &LoadOptions) -> ConfigResult<ResolvedConfig> {
    let mut layering = Layering::from_defaults()?;

    let system = options
        .system_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(SYSTEM_FILE));
    layering.overlay(&system, &ConfigLayer::System)?;
    layering.overlay(&options.user_file()?, &ConfigLayer::User)?;

    if let Some(path) = &options.config_file
        && !layering.overlay(path, &ConfigLayer::File)?
    {
        return Err(ConfigError::missing(path));
    }

    let applied = match &options.env {
        Some(env) => apply_env_fallbacks(&mut layering.tree, &mut layering.sources, env),
        None => apply_env_fallbacks(&mut layering.tree, &mut layering.sources, &collect_env_vars()),
    };
    if applied > 0 {
        debug!(applied, "environment fallbacks used");
    }

    layering.finish("<merged config>")
}

/// Load a single file over the embedded defaults, ignoring every other layer.
///
/// # Errors
///
/// Fails if the file is missing, unreadable, malformed or invalid.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let mut layering = Layering::from_defaults()?;
    if !layering.overlay(path, &ConfigLayer::File)? {
        return Err(ConfigError::missing(path));
    }
    layering
        .finish(&path.display().to_string())
        .map(|resolved| resolved.config)
}

/// `Ok(None)` when the file does not exist.
fn read_toml(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file here");
            return Ok(None);
        },
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            });
        },
    };

    let size = u64::try_from(text.len()).unwrap_or(u64::MAX);
    if size > SIZE_LIMIT {
        return Err(ConfigError::TooLarge {
            path: path.display().to_string(),
            size,
            limit: SIZE_LIMIT,
        });
    }

    toml::from_str(&text)
        .map(Some)
        .map_err(|e| ConfigError::parse(path.display().to_string(), e))
}
