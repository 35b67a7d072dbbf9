//! Single-file media downloads with size-based completeness checks.
//!
//! The media host offers no checksums, so a local file whose length equals
//! the remote `content-length` is considered complete.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::remote::{FetchError, RemoteClient};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("remote size unavailable: {0}")]
    RemoteSize(#[source] FetchError),
    #[error("transfer failed: {0}")]
    Transfer(#[source] FetchError),
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    /// The local file already matched the remote size; nothing transferred.
    AlreadyComplete { bytes: u64 },
    /// The file was (re-)fetched.
    Downloaded { bytes: u64 },
}

/// Make sure `local_path` holds a complete copy of `url`.
///
/// An existing file of the right size is kept; one of any other size is
/// overwritten. There is no retry at this layer.
///
/// # Errors
///
/// Returns an error if the remote size cannot be determined for an existing
/// file, if the transfer fails, or if the file cannot be written.
pub async fn download(
    client: &RemoteClient,
    url: &str,
    local_path: &Path,
) -> Result<DownloadStatus, DownloadError> {
    match tokio::fs::metadata(local_path).await {
        Ok(meta) => {
            let local_size = meta.len();
            let remote_size = client
                .remote_size(url)
                .await
                .map_err(DownloadError::RemoteSize)?;
            if local_size == remote_size {
                debug!(path = %local_path.display(), bytes = local_size, "Local file exists and is complete");
                return Ok(DownloadStatus::AlreadyComplete { bytes: local_size });
            }
            info!(
                path = %local_path.display(),
                local = local_size,
                remote = remote_size,
                "Local file exists but sizes differ, downloading again"
            );
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(DownloadError::Io {
                path: local_path.to_path_buf(),
                source,
            })
        }
    }

    let bytes = transfer(client, url, local_path).await?;
    Ok(DownloadStatus::Downloaded { bytes })
}

/// Stream `url` into `local_path`, truncating any previous contents.
async fn transfer(client: &RemoteClient, url: &str, local_path: &Path) -> Result<u64, DownloadError> {
    debug!(url = %url, path = %local_path.display(), "Downloading");

    let response = client
        .http()
        .get(url)
        .send()
        .await
        .map_err(|source| {
            DownloadError::Transfer(FetchError::Request {
                url: url.to_string(),
                source,
            })
        })?;
    if !response.status().is_success() {
        return Err(DownloadError::Transfer(FetchError::Status {
            url: url.to_string(),
            status: response.status(),
        }));
    }

    let io_err = |source| DownloadError::Io {
        path: local_path.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::create(local_path).await.map_err(io_err)?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| {
            DownloadError::Transfer(FetchError::Request {
                url: url.to_string(),
                source,
            })
        })?;
        file.write_all(&chunk).await.map_err(io_err)?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(io_err)?;
    debug!(path = %local_path.display(), bytes = written, "Download complete");
    Ok(written)
}
