//! On-disk layout of the archive root and per-thread snapshot files.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, trace, warn};

use super::freshness::ValidationSnapshot;
use crate::constants::{POST_LIST_FILE, VALIDATOR_FILE};
use crate::thread::ThreadIdentity;

/// Root of all thread archives, laid out as `{root}/{board}/{thread}`.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
}

impl ArchiveStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn thread(&self, thread: &ThreadIdentity) -> ThreadArchive {
        ThreadArchive {
            dir: thread.archive_dir(&self.root),
        }
    }

    /// Threads previously archived under this root.
    ///
    /// Hidden entries, non-numeric thread directories and threads that never
    /// recorded a validator snapshot are skipped. A missing root yields an
    /// empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory exists but cannot be read.
    pub async fn archived_threads(&self) -> Result<Vec<ThreadIdentity>> {
        let mut threads = Vec::new();

        let mut boards = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(threads),
            Err(e) => {
                return Err(anyhow::Error::new(e)).context(format!(
                    "Failed to read archive root: {}",
                    self.root.display()
                ))
            }
        };

        while let Some(board_entry) = boards.next_entry().await? {
            let board = board_entry.file_name().to_string_lossy().to_string();
            if board.starts_with('.') || !board_entry.file_type().await?.is_dir() {
                continue;
            }

            let board_dir = board_entry.path();
            let mut entries = tokio::fs::read_dir(&board_dir).await.with_context(|| {
                format!("Failed to read board directory: {}", board_dir.display())
            })?;

            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with('.') || !entry.file_type().await?.is_dir() {
                    continue;
                }
                let Ok(thread_id) = name.parse::<u64>() else {
                    debug!(board = %board, entry = %name, "Not a valid thread id, skipping");
                    continue;
                };
                if !entry.path().join(VALIDATOR_FILE).exists() {
                    debug!(board = %board, thread = thread_id, "Thread has no initial data to update");
                    continue;
                }
                threads.push(ThreadIdentity::new(board.clone(), thread_id));
            }
        }

        threads.sort_by(|a, b| {
            a.board()
                .cmp(b.board())
                .then(a.thread_id().cmp(&b.thread_id()))
        });
        Ok(threads)
    }
}

/// One thread's archive directory and its persisted snapshots.
#[derive(Debug, Clone)]
pub struct ThreadArchive {
    dir: PathBuf,
}

impl ThreadArchive {
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn post_list_path(&self) -> PathBuf {
        self.dir.join(POST_LIST_FILE)
    }

    #[must_use]
    pub fn validator_path(&self) -> PathBuf {
        self.dir.join(VALIDATOR_FILE)
    }

    /// Create the archive directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create archive directory: {}", self.dir.display()))
    }

    #[must_use]
    pub fn has_post_list(&self) -> bool {
        self.post_list_path().is_file()
    }

    /// Load the validator snapshot. Missing or unparsable files read as `None`.
    pub async fn read_validators(&self) -> Option<ValidationSnapshot> {
        let path = self.validator_path();
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!(path = %path.display(), "No validator snapshot");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), "Failed to read validator snapshot: {e}");
                return None;
            }
        };

        match serde_json::from_slice(&contents) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(path = %path.display(), "Ignoring malformed validator snapshot: {e}");
                None
            }
        }
    }

    /// Replace the validator snapshot atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be serialized or written.
    pub async fn write_validators(&self, snapshot: &ValidationSnapshot) -> Result<()> {
        let json = serde_json::to_vec_pretty(snapshot).context("Failed to serialize validators")?;
        write_atomic(self.validator_path(), json).await?;
        debug!(path = %self.validator_path().display(), "Wrote validator snapshot");
        Ok(())
    }

    /// Replace the post-list snapshot with the raw fetched payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn write_post_list(&self, raw: &[u8]) -> Result<()> {
        write_atomic(self.post_list_path(), raw.to_vec()).await?;
        debug!(path = %self.post_list_path().display(), bytes = raw.len(), "Wrote post list");
        Ok(())
    }
}

/// Write `contents` to a temp file beside `path`, then rename it over `path`.
///
/// Readers observe either the previous file or the complete new one.
async fn write_atomic(path: PathBuf, contents: Vec<u8>) -> Result<()> {
    tokio::task::spawn_blocking(move || -> Result<()> {
        let dir = path
            .parent()
            .with_context(|| format!("No parent directory for {}", path.display()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(&contents)
            .with_context(|| format!("Failed to write temp file for {}", path.display()))?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to publish {}", path.display()))?;
        Ok(())
    })
    .await
    .context("Snapshot writer task failed")?
}
