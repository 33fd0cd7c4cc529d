//! Configuration file management for fablab.
//!
//! Provides a TOML-based config file at `~/.config/fablab/config.toml` and a
//! resolution chain for the lab state path: CLI flag > env var > config file
//! > default.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default lab state path, relative to the working directory.
pub const DEFAULT_STATE_PATH: &str = ".fablab/state.json";

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub lab: LabSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LabSection {
    /// Path to the JSON lab state file.
    pub state: String,
}

/// Return the fablab config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/fablab` or `~/.config/fablab`.
/// We intentionally ignore the platform-specific `dirs::config_dir()`
/// (which returns `~/Library/Application Support` on macOS).
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("fablab");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("fablab")
}

/// Return the path to the fablab config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    Ok(())
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct FablabConfig {
    pub state_path: PathBuf,
}

impl FablabConfig {
    /// Resolve the lab state path using the chain:
    /// CLI flag > `FABLAB_STATE` env > config file > [`DEFAULT_STATE_PATH`].
    pub fn resolve(cli_state: Option<&str>) -> Result<Self> {
        let state = if let Some(path) = cli_state {
            path.to_string()
        } else if let Ok(path) = std::env::var("FABLAB_STATE") {
            path
        } else if let Ok(cfg) = load_config() {
            cfg.lab.state
        } else {
            DEFAULT_STATE_PATH.to_string()
        };

        Ok(FablabConfig {
            state_path: PathBuf::from(state),
        })
    }
}
