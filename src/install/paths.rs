//! On-disk location of the managed executable

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::platform::Platform;

/// Private storage directory used when no explicit path is configured.
pub fn default_install_dir() -> Result<PathBuf> {
    let base = dirs::data_local_dir().context("could not determine local data directory")?;
    Ok(base.join("sanityd"))
}

/// Compute where the managed executable lives. A configured override is
/// returned verbatim; otherwise the platform executable name inside the
/// default storage directory.
pub fn resolve_executable(configured: Option<&Path>, platform: Platform) -> Result<PathBuf> {
    if let Some(path) = configured {
        return Ok(path.to_path_buf());
    }
    Ok(default_install_dir()?.join(platform.executable_name()))
}

/// Create the parent directory of `path`, including missing intermediate
/// segments. Idempotent.
pub fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
