//! Loading the updater config file.
//!
//! The default file lives in the platform config directory:
//! - macOS: ~/Library/Application Support/com.charlie0129.batt/config.toml
//! - Linux: ~/.config/batt/config.toml

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use batt_updater::UpdaterConfig;
use directories::ProjectDirs;

const APP_QUALIFIER: &str = "com";
const APP_ORG: &str = "charlie0129";
const APP_NAME: &str = "batt";
const CONFIG_FILENAME: &str = "config.toml";

/// Default config file path, if the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .map(|dirs| dirs.config_dir().join(CONFIG_FILENAME))
}

/// Loads the config from `explicit` or from the default location.
///
/// An explicit file must exist and parse. A missing or broken default file
/// falls back to the built-in defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<UpdaterConfig> {
    if let Some(path) = explicit {
        let config = read_config(path)?;
        tracing::info!("Loaded config from {:?}", path);
        return Ok(config);
    }

    let Some(path) = default_config_path() else {
        tracing::warn!("Could not determine config path, using defaults");
        return Ok(UpdaterConfig::default());
    };

    match read_config(&path) {
        Ok(config) => {
            tracing::info!("Loaded config from {:?}", path);
            Ok(config)
        }
        Err(e) if is_not_found(&e) => {
            tracing::debug!("No config file at {:?}, using defaults", path);
            Ok(UpdaterConfig::default())
        }
        Err(e) => {
            tracing::warn!("Ignoring config file: {e:#}");
            Ok(UpdaterConfig::default())
        }
    }
}

fn read_config(path: &Path) -> Result<UpdaterConfig> {
    let content =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let config: UpdaterConfig =
        toml::from_str(&content).with_context(|| format!("parse config {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

fn is_not_found(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<io::Error>()
        .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
}

/// Renders `config` as TOML.
pub fn render_config(config: &UpdaterConfig) -> Result<String> {
    toml::to_string_pretty(config).context("serialize config")
}
