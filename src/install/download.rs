//! Streaming download of the release executable with progress reporting

use std::path::PathBuf;

use futures_util::StreamExt;
use log::debug;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use super::paths;
use super::platform::InstallTarget;

const USER_AGENT: &str = concat!("sanityd/", env!("CARGO_PKG_VERSION"));

/// Cumulative byte count of one download. `total_bytes` is `None` when the
/// response carried no `content-length`; the fraction is indeterminate then.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub bytes_read: u64,
    pub total_bytes: Option<u64>,
}

impl DownloadProgress {
    pub fn fraction(&self) -> Option<f32> {
        match self.total_bytes {
            Some(total) if total > 0 => Some(self.bytes_read as f32 / total as f32),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("server returned HTTP {status} for {url}")]
    HttpStatus {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("empty response body from {url}")]
    NoBody { url: String },

    #[error("could not create install directory for {}: {source}", path.display())]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("download of {url} failed: {source}")]
    TransferFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("could not mark {} executable: {source}", path.display())]
    Permissions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fetch `target.remote_url` and stream it to `target.local_path`, emitting
/// one [`DownloadProgress`] per received chunk. On any failure after the
/// destination file was opened, the partial file is removed (best-effort)
/// before the error is returned; success leaves the complete file as the
/// only artifact.
pub async fn download(
    target: &InstallTarget,
    progress: &mpsc::UnboundedSender<DownloadProgress>,
) -> Result<(), DownloadError> {
    let url = target.remote_url.as_str();

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| transfer_failed(url, e))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| transfer_failed(url, e))?;

    if !response.status().is_success() {
        return Err(DownloadError::HttpStatus {
            status: response.status(),
            url: url.to_string(),
        });
    }

    let total_bytes = response.content_length();
    if total_bytes == Some(0) {
        return Err(DownloadError::NoBody {
            url: url.to_string(),
        });
    }

    // Create the directory as late as possible: a directory left behind by an
    // earlier failed attempt must not mask a real permission error here.
    paths::ensure_parent_dir(&target.local_path).map_err(|source| DownloadError::Resolve {
        path: target.local_path.clone(),
        source,
    })?;

    let mut file = match tokio::fs::File::create(&target.local_path).await {
        Ok(file) => file,
        Err(e) => {
            discard_partial(&target.local_path).await;
            return Err(transfer_failed(url, e));
        }
    };

    let mut stream = response.bytes_stream();
    let mut bytes_read: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                discard_partial(&target.local_path).await;
                return Err(transfer_failed(url, e));
            }
        };
        if let Err(e) = file.write_all(&chunk).await {
            discard_partial(&target.local_path).await;
            return Err(transfer_failed(url, e));
        }
        bytes_read += chunk.len() as u64;
        // Progress is advisory; a receiver that went away does not abort the
        // transfer.
        let _ = progress.send(DownloadProgress {
            bytes_read,
            total_bytes,
        });
    }

    if let Err(e) = file.flush().await {
        discard_partial(&target.local_path).await;
        return Err(transfer_failed(url, e));
    }

    debug!(
        "downloaded {} ({} bytes) to {}",
        url,
        bytes_read,
        target.local_path.display()
    );
    Ok(())
}

fn transfer_failed(
    url: &str,
    source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> DownloadError {
    DownloadError::TransferFailed {
        url: url.to_string(),
        source: source.into(),
    }
}

/// Best-effort removal of a partially written destination. A failure to
/// delete is swallowed; the original transfer error is what callers see.
async fn discard_partial(path: &std::path::Path) {
    if tokio::fs::remove_file(path).await.is_err() {
        debug!("no partial file to remove at {}", path.display());
    }
}
