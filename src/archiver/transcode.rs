//! Media conversion through an external converter process.
//!
//! The converter writes to a temporary path next to the target; the result is
//! published by renaming it over the target only after a clean exit. Leftover
//! temporary files from an interrupted run are removed before the next
//! attempt.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::constants::{TRANSCODE_TARGET_EXT, TRANSCODE_TEMP_MARKER};

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to start converter {}: {source}", binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("converter exited with code {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("converter timed out after {0:?}")]
    TimedOut(Duration),
    #[error("filesystem error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Something that turns one media file into another.
///
/// Success is reported only after `output` has been fully written.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Convert `source` into `output`.
    ///
    /// # Errors
    ///
    /// Returns an error if the conversion did not complete.
    async fn convert(&self, source: &Path, output: &Path) -> Result<(), TranscodeError>;
}

/// Runs an ffmpeg-compatible binary as `<bin> -i <source> -pix_fmt yuv420p <output>`.
#[derive(Debug, Clone)]
pub struct FfmpegConverter {
    binary: PathBuf,
    timeout: Option<Duration>,
}

impl FfmpegConverter {
    #[must_use]
    pub fn new(binary: PathBuf, timeout: Option<Duration>) -> Self {
        Self { binary, timeout }
    }

    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl Converter for FfmpegConverter {
    async fn convert(&self, source: &Path, output: &Path) -> Result<(), TranscodeError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-i")
            .arg(source)
            .args(["-pix_fmt", "yuv420p"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let run = cmd.output();
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| TranscodeError::TimedOut(limit))?,
            None => run.await,
        };
        let output = result.map_err(|source| TranscodeError::Spawn {
            binary: self.binary.clone(),
            source,
        })?;

        if !output.status.success() {
            // Keep the tail, which is where ffmpeg puts the actual error.
            const MAX_STDERR: usize = 2000;
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let start = stderr
                .char_indices()
                .rev()
                .nth(MAX_STDERR)
                .map_or(0, |(i, _)| i);
            return Err(TranscodeError::Failed {
                code: output.status.code(),
                stderr: stderr[start..].to_string(),
            });
        }
        Ok(())
    }
}

/// Find the converter binary.
///
/// With `binary_dir` set, the binary must exist inside it (with `.exe`
/// appended on Windows). Otherwise `PATH` is searched.
#[must_use]
pub fn locate_converter(binary_dir: Option<&Path>, name: &str) -> Option<PathBuf> {
    match binary_dir {
        Some(dir) => {
            let mut file_name = name.to_string();
            if cfg!(windows) && !file_name.ends_with(".exe") {
                file_name.push_str(".exe");
            }
            let path = dir.join(file_name);
            path.is_file().then_some(path)
        }
        None => which::which(name).ok(),
    }
}

/// Where the converter writes before the result is published.
#[must_use]
pub fn temporary_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(format!("{TRANSCODE_TEMP_MARKER}.{TRANSCODE_TARGET_EXT}"));
    PathBuf::from(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeStatus {
    /// The target existed already; the converter was not run.
    AlreadyConverted,
    Converted,
}

/// Crash-safe conversion of one source file into its target path.
#[derive(Clone)]
pub struct TranscodeEngine {
    converter: Arc<dyn Converter>,
}

impl TranscodeEngine {
    #[must_use]
    pub fn new(converter: Arc<dyn Converter>) -> Self {
        Self { converter }
    }

    /// Convert `source` into `target` unless `target` already exists.
    ///
    /// Never touches `source`. On failure the temporary output is left for
    /// the next run's cleanup.
    ///
    /// # Errors
    ///
    /// Returns an error if stale temp cleanup, the converter, or the final
    /// rename fails.
    pub async fn convert(&self, source: &Path, target: &Path) -> Result<TranscodeStatus, TranscodeError> {
        let temp = temporary_path(target);
        remove_stale(&temp).await?;

        if tokio::fs::try_exists(target)
            .await
            .map_err(|source| TranscodeError::Io {
                path: target.to_path_buf(),
                source,
            })?
        {
            debug!(target = %target.display(), "File already converted");
            return Ok(TranscodeStatus::AlreadyConverted);
        }

        info!(
            source = %source.file_name().unwrap_or_default().to_string_lossy(),
            "Converting"
        );
        self.converter.convert(source, &temp).await?;

        tokio::fs::rename(&temp, target)
            .await
            .map_err(|source| TranscodeError::Io {
                path: target.to_path_buf(),
                source,
            })?;
        debug!(target = %target.display(), "Published converted file");
        Ok(TranscodeStatus::Converted)
    }
}

async fn remove_stale(temp: &Path) -> Result<(), TranscodeError> {
    match tokio::fs::remove_file(temp).await {
        Ok(()) => {
            warn!(path = %temp.display(), "Cleaned up temporary file from previous run");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(TranscodeError::Io {
            path: temp.to_path_buf(),
            source,
        }),
    }
}
