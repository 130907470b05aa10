//! On-demand installation of the Sanity executable
//!
//! The coordinator owns the single-flight guarantee: at most one download is
//! in flight, duplicate requests are absorbed, and a finished attempt (either
//! way) returns the coordinator to its idle state. Everything underneath is
//! plumbing: platform/asset selection, path resolution, and the streaming
//! download itself.

pub mod download;
pub mod paths;
pub mod platform;

use std::sync::atomic::{AtomicBool, Ordering};

use log::info;
use tokio::sync::mpsc;

use download::{DownloadError, DownloadProgress};
use platform::InstallTarget;

/// Terminal result of one install request.
#[derive(Debug)]
pub enum InstallOutcome {
    /// The executable was downloaded and is ready to launch.
    Installed,
    /// Another install was already in flight; this request did nothing.
    AlreadyInstalling,
    /// The attempt failed; the destination was left clean. The underlying
    /// [`DownloadError`] is recoverable via downcast.
    Failed(anyhow::Error),
}

/// Serializes install requests.
pub struct InstallCoordinator {
    installing: AtomicBool,
}

impl InstallCoordinator {
    pub fn new() -> Self {
        Self {
            installing: AtomicBool::new(false),
        }
    }

    pub fn is_installing(&self) -> bool {
        self.installing.load(Ordering::SeqCst)
    }

    /// Download the executable for `target`, streaming progress to
    /// `progress`. A request made while another is in flight returns
    /// [`InstallOutcome::AlreadyInstalling`] without touching the network.
    pub async fn request_install(
        &self,
        target: InstallTarget,
        progress: mpsc::UnboundedSender<DownloadProgress>,
    ) -> InstallOutcome {
        if self
            .installing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return InstallOutcome::AlreadyInstalling;
        }
        // Clear the flag even if this future is dropped mid-download.
        let _guard = ClearOnDrop(&self.installing);

        info!(
            "installing sanity from {} to {}",
            target.remote_url,
            target.local_path.display()
        );

        let result = download::download(&target, &progress)
            .await
            .and_then(|()| mark_executable(&target));

        match result {
            Ok(()) => {
                info!("sanity installed at {}", target.local_path.display());
                InstallOutcome::Installed
            }
            Err(e) => InstallOutcome::Failed(e.into()),
        }
    }
}

impl Default for InstallCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

struct ClearOnDrop<'a>(&'a AtomicBool);

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The release asset is a bare binary; the downloaded file needs the
/// executable bit before it can be spawned.
#[cfg(unix)]
fn mark_executable(target: &InstallTarget) -> Result<(), DownloadError> {
    use std::os::unix::fs::PermissionsExt;

    let map_err = |source| DownloadError::Permissions {
        path: target.local_path.clone(),
        source,
    };
    let mut perms = std::fs::metadata(&target.local_path)
        .map_err(map_err)?
        .permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&target.local_path, perms).map_err(map_err)
}

#[cfg(not(unix))]
fn mark_executable(_target: &InstallTarget) -> Result<(), DownloadError> {
    Ok(())
}
