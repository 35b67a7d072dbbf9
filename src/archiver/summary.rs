//! Per-run tallies of what happened to a thread's media.

use std::collections::BTreeMap;
use std::fmt;

use super::pipeline::{ConversionState, FailureKind, FetchState, TaskOutcome};
use crate::archive::Freshness;
use crate::thread::ThreadIdentity;

/// How far a run got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Validators matched and a local post list exists; nothing fetched.
    Unchanged,
    /// The media pass ran.
    Archived,
    /// The post list could not be fetched.
    FetchFailed(String),
}

/// Aggregate result of one thread run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub thread: ThreadIdentity,
    pub freshness: Freshness,
    pub status: RunStatus,
    pub media_total: usize,
    pub downloaded: usize,
    pub downloaded_bytes: u64,
    /// Already complete locally, including items skipped because their
    /// converted copy exists.
    pub skipped: usize,
    pub converted: usize,
    pub removed_originals: usize,
    pub failures: BTreeMap<FailureKind, usize>,
    /// `(post id, reason, message)` for each failed item.
    pub failed_items: Vec<(u64, FailureKind, String)>,
}

impl RunSummary {
    #[must_use]
    pub fn new(thread: ThreadIdentity, freshness: Freshness, status: RunStatus) -> Self {
        Self {
            thread,
            freshness,
            status,
            media_total: 0,
            downloaded: 0,
            downloaded_bytes: 0,
            skipped: 0,
            converted: 0,
            removed_originals: 0,
            failures: BTreeMap::new(),
            failed_items: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: &TaskOutcome) {
        match outcome.fetch {
            Some(FetchState::Downloaded { bytes }) => {
                self.downloaded += 1;
                self.downloaded_bytes += bytes;
            }
            Some(FetchState::AlreadyComplete | FetchState::SkippedConverted) => self.skipped += 1,
            None => {}
        }
        if outcome.conversion == Some(ConversionState::Converted) {
            self.converted += 1;
        }
        if outcome.removed_original {
            self.removed_originals += 1;
        }
        if let Some(failure) = &outcome.failure {
            self.record_failure(outcome.post_id, failure.kind, failure.message.clone());
        }
    }

    pub fn record_failure(&mut self, post_id: u64, kind: FailureKind, message: String) {
        *self.failures.entry(kind).or_default() += 1;
        self.failed_items.push((post_id, kind, message));
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.values().sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            RunStatus::Unchanged => return write!(f, "{}: no updates", self.thread),
            RunStatus::FetchFailed(reason) => {
                return write!(f, "{}: could not fetch post list: {reason}", self.thread)
            }
            RunStatus::Archived => {}
        }

        write!(
            f,
            "{}: {} media, {} downloaded, {} skipped (already complete), {} converted, {} originals removed, {} failed",
            self.thread,
            self.media_total,
            self.downloaded,
            self.skipped,
            self.converted,
            self.removed_originals,
            self.failed()
        )?;
        if !self.failures.is_empty() {
            let reasons: Vec<String> = self
                .failures
                .iter()
                .map(|(kind, count)| format!("{kind}: {count}"))
                .collect();
            write!(f, " ({})", reasons.join(", "))?;
        }
        Ok(())
    }
}
