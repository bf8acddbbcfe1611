//! Layered config file discovery and loading.
//!
//! Precedence, lowest to highest:
//!
//! 1. Embedded defaults (`defaults.toml`, compiled into the binary)
//! 2. System (`/etc/ralph/config.toml`)
//! 3. User (`~/.ralph/config.toml`)
//! 4. Workspace (`{workspace_root}/.ralph/config.toml`)
//!
//! Each layer is parsed as a bare [`toml::Value`] and deep-merged into the
//! accumulated table before the final deserialize into [`Config`], so a
//! layer may set just the one field it cares about.

use std::path::{Path, PathBuf};

use toml::Value;
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::merge::deep_merge;
use crate::types::Config;
use crate::validate;

const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Loads the layered configuration, validating the result.
///
/// `workspace_root` is the current project root; the workspace layer is
/// skipped when `None`. `home_override` replaces `$HOME` for user-layer
/// discovery (tests; a real process leaves this `None`).
///
/// # Errors
///
/// Returns a [`ConfigError`] if any present layer is not valid TOML, the
/// merged result does not deserialize into [`Config`], or validation
/// fails.
pub fn load(workspace_root: Option<&Path>, home_override: Option<&Path>) -> ConfigResult<Config> {
    let mut merged = parse(DEFAULTS_TOML, "<embedded defaults>")?;

    let system_path = PathBuf::from("/etc/ralph/config.toml");
    if let Some(overlay) = try_load_file(&system_path)? {
        debug!(path = %system_path.display(), "loaded system config layer");
        deep_merge(&mut merged, &overlay);
    }

    let home_dir = home_override.map(Path::to_path_buf).or_else(|| std::env::var_os("HOME").map(PathBuf::from));
    if let Some(home_dir) = &home_dir {
        let user_path = home_dir.join(".ralph").join("config.toml");
        if let Some(overlay) = try_load_file(&user_path)? {
            debug!(path = %user_path.display(), "loaded user config layer");
            deep_merge(&mut merged, &overlay);
        }
    }

    if let Some(workspace_root) = workspace_root {
        let workspace_path = workspace_root.join(".ralph").join("config.toml");
        if let Some(overlay) = try_load_file(&workspace_path)? {
            debug!(path = %workspace_path.display(), "loaded workspace config layer");
            deep_merge(&mut merged, &overlay);
        }
    }

    let merged_text = toml::to_string(&merged).expect("merged config table always serializes");
    let config: Config = toml::from_str(&merged_text).map_err(ConfigError::Deserialize)?;
    validate::validate(&config)?;
    info!(provider = %config.model.provider, model = %config.model.model, "configuration loaded");
    Ok(config)
}

/// Loads and validates a single file with no layering, for `--config <path>`
/// style explicit overrides.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, is not valid TOML,
/// or the result fails validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
    let config: Config = toml::from_str(&text).map_err(ConfigError::Deserialize)?;
    validate::validate(&config)?;
    Ok(config)
}

fn try_load_file(path: &Path) -> ConfigResult<Option<Value>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(parse(&text, &path.display().to_string())?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Io { path: path.display().to_string(), source }),
    }
}

fn parse(text: &str, path: &str) -> ConfigResult<Value> {
    toml::from_str(text).map_err(|source| ConfigError::Parse { path: path.to_string(), source })
}
