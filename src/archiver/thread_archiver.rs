//! Incremental archiving of one thread.
//!
//! A run checks the thread's validators, refreshes the post-list snapshot if
//! needed, mirrors every attachment through the item pipeline and finally
//! records the new validators. The validators are only written after the
//! media pass, so an interrupted run leaves the thread marked outdated.
//! Items that failed in a completed pass are picked up again the next time
//! the thread changes.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::pipeline::{FailureKind, ItemPipeline, TaskOutcome};
use super::runner::{run_all, Progress};
use super::summary::{RunStatus, RunSummary};
use super::transcode::{locate_converter, Converter, FfmpegConverter, TranscodeEngine};
use crate::archive::{ArchiveStore, Freshness, FreshnessDetector, ThreadArchive};
use crate::config::Config;
use crate::media::{self, MediaItem, PostList};
use crate::remote::RemoteClient;
use crate::thread::ThreadIdentity;

/// Look up the converter once per process.
///
/// Returns `None` when conversion is off, or when it was requested but no
/// binary was found; the latter is logged here.
#[must_use]
pub fn resolve_converter(config: &Config) -> Option<Arc<dyn Converter>> {
    if !config.convert_media {
        return None;
    }
    if let Some(dir) = &config.converter_dir {
        info!(path = %dir.display(), "Converter directory set");
    }
    match locate_converter(config.converter_dir.as_deref(), &config.converter_name) {
        Some(binary) => {
            info!(path = %binary.display(), "Converter found");
            Some(Arc::new(FfmpegConverter::new(binary, config.convert_timeout)))
        }
        None => {
            warn!(
                name = %config.converter_name,
                "Converter not found, media will not be converted"
            );
            None
        }
    }
}

/// Archiver for a single thread.
pub struct ThreadArchiver {
    thread: ThreadIdentity,
    archive: ThreadArchive,
    client: RemoteClient,
    transcoder: Option<TranscodeEngine>,
    remove_original: bool,
    parallel: usize,
}

impl ThreadArchiver {
    /// `converter` is `None` when conversion is disabled or unavailable.
    #[must_use]
    pub fn new(
        config: &Config,
        client: RemoteClient,
        store: &ArchiveStore,
        thread: ThreadIdentity,
        converter: Option<Arc<dyn Converter>>,
    ) -> Self {
        Self {
            archive: store.thread(&thread),
            thread,
            client,
            transcoder: converter.map(TranscodeEngine::new),
            remove_original: config.remove_original,
            parallel: config.parallel.max(1),
        }
    }

    #[must_use]
    pub fn thread(&self) -> &ThreadIdentity {
        &self.thread
    }

    /// Bring the local archive up to date with the remote thread.
    ///
    /// Network and per-item failures are reported in the summary.
    ///
    /// # Errors
    ///
    /// Returns an error only for local setup or snapshot write failures.
    pub async fn archive(&self) -> Result<RunSummary> {
        self.archive.ensure_dir().await?;

        let detector = FreshnessDetector::new(&self.client, &self.archive, &self.thread);
        let validators = detector.fetch().await;
        let had_post_list = self.archive.has_post_list();
        let freshness = detector.check(validators.as_ref(), true).await?;

        if !freshness.is_outdated() && had_post_list {
            info!(thread = %self.thread, "Thread has no updates");
            return Ok(RunSummary::new(
                self.thread.clone(),
                freshness,
                RunStatus::Unchanged,
            ));
        }
        if !had_post_list {
            debug!(thread = %self.thread, "Local post list doesn't exist");
        }

        let fetched = match self.client.fetch_post_list(&self.thread).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(thread = %self.thread, "Could not load post data: {e}");
                return Ok(RunSummary::new(
                    self.thread.clone(),
                    freshness,
                    RunStatus::FetchFailed(e.to_string()),
                ));
            }
        };
        self.archive
            .write_post_list(&fetched.raw)
            .await
            .context("Failed to write post list")?;

        info!(thread = %self.thread, freshness = %freshness, "Starting archive of thread");
        let summary = self.run_media_pass(&fetched.posts, freshness).await;

        if summary.failed() > 0 {
            warn!(
                thread = %self.thread,
                failed = summary.failed(),
                "Some media could not be archived"
            );
        }
        match &validators {
            Some(current) => detector.persist(current).await?,
            None => debug!(thread = %self.thread, "No validators to record"),
        }

        Ok(summary)
    }

    /// Process the attachment of a single post, without touching the
    /// freshness state.
    ///
    /// # Errors
    ///
    /// Returns an error if the post list cannot be fetched, or if the post
    /// does not exist or has no attachment.
    pub async fn archive_post(&self, post_id: u64) -> Result<TaskOutcome> {
        self.archive.ensure_dir().await?;

        let fetched = self
            .client
            .fetch_post_list(&self.thread)
            .await
            .context("Post data can't be retrieved from API")?;
        let post = fetched
            .posts
            .find(post_id)
            .with_context(|| format!("Post {post_id} not found in thread {}", self.thread))?;
        let item = self
            .resolve(post)
            .with_context(|| format!("Post {post_id} has no media"))?;

        Ok(self.pipeline().process(item).await)
    }

    async fn run_media_pass(&self, posts: &PostList, freshness: Freshness) -> RunSummary {
        let items: Vec<MediaItem> = posts.media_posts().filter_map(|p| self.resolve(p)).collect();
        let post_ids: Vec<u64> = items.iter().map(|item| item.post_id).collect();

        let mut summary = RunSummary::new(self.thread.clone(), freshness, RunStatus::Archived);
        summary.media_total = items.len();
        info!(
            thread = %self.thread,
            media = items.len(),
            total_bytes = posts.total_media_size(),
            parallel = self.parallel,
            "Found media items in the thread"
        );

        let pipeline = Arc::new(self.pipeline());
        let thread = &self.thread;
        let report = run_all(
            items,
            self.parallel,
            move |item| {
                let pipeline = Arc::clone(&pipeline);
                async move { pipeline.process(item).await }
            },
            |progress: Progress| {
                info!(
                    thread = %thread,
                    "Processed media {}/{} ({}%)",
                    progress.completed,
                    progress.total,
                    progress.percent()
                );
            },
        )
        .await;

        for outcome in &report.outcomes {
            summary.record(outcome);
        }
        for index in report.panicked {
            summary.record_failure(
                post_ids[index],
                FailureKind::Panicked,
                "media task panicked".to_string(),
            );
        }

        info!(thread = %self.thread, "{summary}");
        summary
    }

    fn resolve(&self, post: &media::PostRecord) -> Option<MediaItem> {
        media::resolve(
            &self.thread,
            self.archive.dir(),
            self.client.media_base(),
            post,
            self.transcoder.is_some(),
        )
    }

    fn pipeline(&self) -> ItemPipeline {
        ItemPipeline::new(
            self.client.clone(),
            self.transcoder.clone(),
            self.remove_original,
        )
    }
}
