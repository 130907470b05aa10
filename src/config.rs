//! Supervisor configuration (mirrors the host settings namespace)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8000;

/// On-disk TOML configuration for the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Explicit path to the sanity executable. Unset means the managed
    /// default location inside the private storage directory.
    pub path: Option<PathBuf>,
    /// Port passed to the server on launch.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Launch automatically when the workspace contains sanity content.
    #[serde(default = "default_true")]
    pub auto_enable: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true() -> bool {
    true
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            path: None,
            port: DEFAULT_PORT,
            auto_enable: true,
        }
    }
}

impl SupervisorConfig {
    /// Read the config file, falling back to defaults when it does not
    /// exist. Never writes; safe for side-effect-free queries.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Persist this config to `path`, creating parent directories as needed.
    pub fn store(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("failed to create config directory")?;
        }
        let raw = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, raw)
            .with_context(|| format!("failed to write config file {}", path.display()))
    }
}

/// Location of the config file: an explicit `--config` argument, or
/// `<config-dir>/sanityd/sanityd.toml`.
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let config_dir = dirs::config_dir()
        .context("could not determine config directory")?
        .join("sanityd");
    Ok(config_dir.join("sanityd.toml"))
}

/// Write a default config file if none exists yet, so users have something
/// to edit.
pub fn ensure_config_file(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    log::info!(
        "config not found at {}, creating default configuration",
        path.display()
    );
    SupervisorConfig::default().store(path)
}
