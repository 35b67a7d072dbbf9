//! Deciding whether a thread changed since the last archive run.
//!
//! The remote validators are fetched once per run and passed around as a
//! value, so the peek at the start of a run and the write-back at the end see
//! the same headers.

use std::fmt;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use super::store::ThreadArchive;
use crate::remote::RemoteClient;
use crate::thread::ThreadIdentity;

/// Last observed cache validators of a thread's API resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(
        rename = "last-modified",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_modified: Option<String>,
    #[serde(
        rename = "content-length",
        default,
        deserialize_with = "lenient_length",
        skip_serializing_if = "Option::is_none"
    )]
    pub content_length: Option<u64>,
    /// When the snapshot was taken. Informational, never compared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Accept the length as a number or as the raw header string.
fn lenient_length<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) => Some(n),
        Some(Raw::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorField {
    ETag,
    LastModified,
    ContentLength,
}

impl fmt::Display for ValidatorField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ETag => "etag",
            Self::LastModified => "last-modified",
            Self::ContentLength => "content-length",
        })
    }
}

/// Outcome of comparing stored and current validators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Unchanged,
    Changed(ValidatorField),
    NoSnapshot,
    /// The validators could not be fetched; treated as outdated.
    RemoteUnavailable,
}

impl Freshness {
    #[must_use]
    pub fn is_outdated(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unchanged => f.write_str("unchanged"),
            Self::Changed(field) => write!(f, "changed ({field})"),
            Self::NoSnapshot => f.write_str("never archived"),
            Self::RemoteUnavailable => f.write_str("remote unavailable"),
        }
    }
}

/// Compare validators field by field.
///
/// A field present on both sides and differing decides the result; fields
/// missing on either side are skipped.
#[must_use]
pub fn compare(stored: Option<&ValidationSnapshot>, current: &ValidationSnapshot) -> Freshness {
    let Some(stored) = stored else {
        return Freshness::NoSnapshot;
    };

    if differs(stored.etag.as_ref(), current.etag.as_ref()) {
        return Freshness::Changed(ValidatorField::ETag);
    }
    if differs(stored.last_modified.as_ref(), current.last_modified.as_ref()) {
        return Freshness::Changed(ValidatorField::LastModified);
    }
    if differs(stored.content_length.as_ref(), current.content_length.as_ref()) {
        return Freshness::Changed(ValidatorField::ContentLength);
    }
    Freshness::Unchanged
}

fn differs<T: PartialEq>(a: Option<&T>, b: Option<&T>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a != b)
}

/// Freshness checks for one thread.
pub struct FreshnessDetector<'a> {
    client: &'a RemoteClient,
    archive: &'a ThreadArchive,
    thread: &'a ThreadIdentity,
}

impl<'a> FreshnessDetector<'a> {
    #[must_use]
    pub fn new(
        client: &'a RemoteClient,
        archive: &'a ThreadArchive,
        thread: &'a ThreadIdentity,
    ) -> Self {
        Self {
            client,
            archive,
            thread,
        }
    }

    /// Fetch the current validators, logging (not returning) fetch failures.
    pub async fn fetch(&self) -> Option<ValidationSnapshot> {
        match self.client.fetch_validators(self.thread).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(thread = %self.thread, "Couldn't load remote validators: {e}");
                None
            }
        }
    }

    /// Compare `current` against the stored snapshot.
    ///
    /// When outdated and `peek_only` is false, `current` is persisted before
    /// returning. `peek_only` never writes.
    ///
    /// # Errors
    ///
    /// Returns an error only if persisting the new snapshot fails.
    pub async fn check(
        &self,
        current: Option<&ValidationSnapshot>,
        peek_only: bool,
    ) -> Result<Freshness> {
        let Some(current) = current else {
            return Ok(Freshness::RemoteUnavailable);
        };

        let stored = self.archive.read_validators().await;
        let freshness = compare(stored.as_ref(), current);
        match freshness {
            Freshness::Unchanged => debug!(thread = %self.thread, "Validators unchanged"),
            Freshness::NoSnapshot => info!(thread = %self.thread, "Local metadata not found"),
            Freshness::Changed(field) => {
                info!(thread = %self.thread, field = %field, "Validator didn't match");
            }
            Freshness::RemoteUnavailable => {}
        }

        if freshness.is_outdated() && !peek_only {
            self.persist(current).await?;
        }
        Ok(freshness)
    }

    /// Fetch the validators and report whether the thread is outdated.
    ///
    /// # Errors
    ///
    /// Returns an error only if persisting the new snapshot fails.
    pub async fn is_outdated(&self, peek_only: bool) -> Result<bool> {
        let current = self.fetch().await;
        Ok(self.check(current.as_ref(), peek_only).await?.is_outdated())
    }

    /// Store `current` as the latest snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub async fn persist(&self, current: &ValidationSnapshot) -> Result<()> {
        let snapshot = ValidationSnapshot {
            recorded_at: Some(Utc::now()),
            ..current.clone()
        };
        self.archive.write_validators(&snapshot).await
    }
}
