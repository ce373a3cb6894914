//! Configuration for cloudsettle
//!
//! Wait timing is tunable per call site through a YAML settings file, and a
//! set of environment-supplied tags is attached to every tagged resource.

pub mod error;
pub mod settings;

pub use error::*;
pub use settings::{WaitProfile, WaitSettings};

use std::path::PathBuf;

pub const CONFIG_PATH_ENV: &str = "CLOUDSETTLE_CONFIG_PATH";
pub const ENV_TAGS_ENV: &str = "CLOUDSETTLE_ENV_TAGS";

const CANDIDATES: [&str; 4] = [
    "cloudsettle.local.yaml",
    ".cloudsettle.local.yaml",
    "cloudsettle.yaml",
    ".cloudsettle.yaml",
];

/// cloudsettle's directory under the user config dir
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("cloudsettle");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Locate the settings file
///
/// Search order:
/// 1. `CLOUDSETTLE_CONFIG_PATH`
/// 2. current directory: cloudsettle.local.yaml, .cloudsettle.local.yaml,
///    cloudsettle.yaml, .cloudsettle.yaml
/// 3. the same names inside `./.cloudsettle/`
/// 4. ~/.config/cloudsettle/cloudsettle.yaml
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(path = %path.display(), "{} points at a missing file", CONFIG_PATH_ENV);
    }

    let current_dir = std::env::current_dir()?;

    if let Some(path) = CANDIDATES
        .iter()
        .map(|name| current_dir.join(name))
        .find(|path| path.exists())
    {
        return Ok(path);
    }

    let local_dir = current_dir.join(".cloudsettle");
    if local_dir.is_dir()
        && let Some(path) = CANDIDATES
            .iter()
            .map(|name| local_dir.join(name))
            .find(|path| path.exists())
    {
        return Ok(path);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("cloudsettle").join("cloudsettle.yaml");
        if global.exists() {
            return Ok(global);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Load wait settings from the discovered file, or built-in defaults when
/// there is none
pub fn load_settings() -> Result<WaitSettings> {
    match find_config_file() {
        Ok(path) => WaitSettings::load(&path),
        Err(ConfigError::ConfigFileNotFound) => {
            tracing::debug!("No settings file found, using built-in wait timing");
            Ok(WaitSettings::default())
        }
        Err(e) => Err(e),
    }
}

/// Tags from `CLOUDSETTLE_ENV_TAGS` (comma separated, blanks dropped)
pub fn env_tags() -> Vec<String> {
    std::env::var(ENV_TAGS_ENV)
        .map(|raw| parse_tag_list(&raw))
        .unwrap_or_default()
}

pub fn parse_tag_list(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}
