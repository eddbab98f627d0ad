//! Configuration file and folder resolution
//!
//! Folder resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file key
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Application directory name under the platform config/data dirs
pub const APP_DIR: &str = "dozy";

/// Resolve a folder setting from CLI, environment, config file, then default
pub fn resolve_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    config_file: Option<&Path>,
    config_file_key: &str,
    default: PathBuf,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(config_path) = config_file {
        if let Ok(content) = std::fs::read_to_string(config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&content) {
                if let Some(value) = config.get(config_file_key).and_then(|v| v.as_str()) {
                    return PathBuf::from(value);
                }
            }
        }
    }

    default
}

/// Locate the default configuration file for the platform
///
/// Linux checks `~/.config/dozy/config.toml` then `/etc/dozy/config.toml`;
/// other platforms use the user config directory only.
pub fn find_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"));

    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(APP_DIR).join("config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// OS-dependent default data folder (settings file lives here)
pub fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("./dozy_data"))
}

/// OS-dependent default sound asset folder
pub fn default_asset_folder() -> PathBuf {
    default_data_folder().join("sounds")
}
