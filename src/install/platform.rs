//! Platform detection for release asset selection

use std::path::PathBuf;

/// Default upstream location of Sanity release builds.
const DEFAULT_RELEASE_BASE: &str =
    "https://github.com/nonk123/sanity/releases/download/gh-actions";

/// Environment variable overriding the release base URL (mirrors, tests).
pub const RELEASE_BASE_ENV: &str = "SANITYD_RELEASE_BASE";

/// Release builds come in exactly two flavors: one for Windows and one for
/// everything else. Adding a third platform means adding a variant here, not
/// touching call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Posix,
}

impl Platform {
    /// Detect the platform this build is running on.
    pub fn host() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Posix
        }
    }

    /// File name of the managed executable on disk.
    pub fn executable_name(&self) -> &'static str {
        match self {
            Platform::Windows => "sanity.exe",
            Platform::Posix => "sanity",
        }
    }

    /// Name of the release asset published for this platform.
    pub fn release_asset(&self) -> &'static str {
        match self {
            Platform::Windows => "sanity-release-windows.exe",
            Platform::Posix => "sanity-release-linux",
        }
    }
}

/// Resolve the release base URL: explicit override, then environment, then
/// the fixed upstream location.
pub fn release_base(override_base: Option<&str>) -> String {
    if let Some(base) = override_base {
        return base.trim_end_matches('/').to_string();
    }
    match std::env::var(RELEASE_BASE_ENV) {
        Ok(base) if !base.is_empty() => base.trim_end_matches('/').to_string(),
        _ => DEFAULT_RELEASE_BASE.to_string(),
    }
}

/// Everything the downloader needs to fetch one executable: where it comes
/// from and where it lands. Recomputed per operation, never cached.
#[derive(Debug, Clone)]
pub struct InstallTarget {
    pub platform: Platform,
    pub remote_url: String,
    pub local_path: PathBuf,
}

impl InstallTarget {
    pub fn new(platform: Platform, release_base: &str, local_path: PathBuf) -> Self {
        let remote_url = format!("{}/{}", release_base, platform.release_asset());
        Self {
            platform,
            remote_url,
            local_path,
        }
    }
}
