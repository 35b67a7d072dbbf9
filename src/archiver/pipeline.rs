//! The per-item pipeline: download, conditional conversion, conditional
//! removal of the original.

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use super::download::{download, DownloadStatus};
use super::transcode::{TranscodeEngine, TranscodeStatus};
use crate::media::MediaItem;
use crate::remote::RemoteClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FailureKind {
    Download,
    Conversion,
    RemoveOriginal,
    Panicked,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Download => "download",
            Self::Conversion => "conversion",
            Self::RemoveOriginal => "remove-original",
            Self::Panicked => "panicked",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// What happened to the original file of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Downloaded { bytes: u64 },
    AlreadyComplete,
    /// Not fetched because the converted file exists and the original is
    /// not wanted.
    SkippedConverted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionState {
    Converted,
    AlreadyConverted,
}

/// Result of one item's pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub post_id: u64,
    pub fetch: Option<FetchState>,
    pub conversion: Option<ConversionState>,
    /// The original, if it is still on disk after the pipeline.
    pub downloaded_path: Option<PathBuf>,
    pub converted_path: Option<PathBuf>,
    pub removed_original: bool,
    pub failure: Option<ItemFailure>,
}

impl TaskOutcome {
    fn new(post_id: u64) -> Self {
        Self {
            post_id,
            fetch: None,
            conversion: None,
            downloaded_path: None,
            converted_path: None,
            removed_original: false,
            failure: None,
        }
    }

    fn fail(mut self, kind: FailureKind, message: String) -> Self {
        self.failure = Some(ItemFailure { kind, message });
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Everything a worker needs to process media items of one thread.
#[derive(Clone)]
pub struct ItemPipeline {
    client: RemoteClient,
    transcoder: Option<TranscodeEngine>,
    remove_original: bool,
}

impl ItemPipeline {
    #[must_use]
    pub fn new(client: RemoteClient, transcoder: Option<TranscodeEngine>, remove_original: bool) -> Self {
        Self {
            client,
            transcoder,
            remove_original,
        }
    }

    /// Run the pipeline for one item. Failures are reported in the outcome.
    pub async fn process(&self, item: MediaItem) -> TaskOutcome {
        let mut outcome = TaskOutcome::new(item.post_id);
        let conversion = self.transcoder.as_ref().zip(item.target_path.as_deref());

        // The converted copy is all that would be kept, so skip fetching the
        // original again.
        let skip_download = match conversion {
            Some((_, target)) if self.remove_original => {
                tokio::fs::try_exists(target).await.unwrap_or(false)
            }
            _ => false,
        };

        if skip_download {
            debug!(post_id = item.post_id, "Converted file exists, skipping download");
            outcome.fetch = Some(FetchState::SkippedConverted);
        } else {
            match download(&self.client, &item.remote_url, &item.source_path).await {
                Ok(DownloadStatus::AlreadyComplete { .. }) => {
                    outcome.fetch = Some(FetchState::AlreadyComplete);
                }
                Ok(DownloadStatus::Downloaded { bytes }) => {
                    outcome.fetch = Some(FetchState::Downloaded { bytes });
                }
                Err(e) => {
                    warn!(post_id = item.post_id, url = %item.remote_url, "Could not get media: {e}");
                    return outcome.fail(FailureKind::Download, e.to_string());
                }
            }
            outcome.downloaded_path = Some(item.source_path.clone());
        }

        let Some((engine, target)) = conversion else {
            if self.remove_original {
                debug!(post_id = item.post_id, "Original won't be removed because no conversion was done");
            }
            return outcome;
        };

        match engine.convert(&item.source_path, target).await {
            Ok(status) => {
                outcome.conversion = Some(match status {
                    TranscodeStatus::Converted => ConversionState::Converted,
                    TranscodeStatus::AlreadyConverted => ConversionState::AlreadyConverted,
                });
                outcome.converted_path = Some(target.to_path_buf());
            }
            Err(e) => {
                warn!(post_id = item.post_id, "Conversion failed, keeping original: {e}");
                return outcome.fail(FailureKind::Conversion, e.to_string());
            }
        }

        if self.remove_original {
            match tokio::fs::remove_file(&item.source_path).await {
                Ok(()) => {
                    info!(post_id = item.post_id, path = %item.source_path.display(), "Removed original file");
                    outcome.removed_original = true;
                    outcome.downloaded_path = None;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    outcome.downloaded_path = None;
                }
                Err(e) => {
                    warn!(post_id = item.post_id, "Failed to remove original: {e}");
                    return outcome.fail(FailureKind::RemoveOriginal, e.to_string());
                }
            }
        }

        outcome
    }
}
