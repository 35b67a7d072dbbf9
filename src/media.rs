//! Post records and the media items derived from them.
//!
//! Path derivation here is pure: the same archive directory and post always
//! produce the same paths, which is what makes repeated runs resumable.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::constants::{TRANSCODE_SOURCE_EXT, TRANSCODE_TARGET_EXT};
use crate::thread::ThreadIdentity;

/// The thread payload returned by the JSON API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostList {
    #[serde(default)]
    pub posts: Vec<PostRecord>,
}

/// One post from the remote post list. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PostRecord {
    #[serde(rename = "no")]
    pub post_id: u64,
    #[serde(rename = "tim", default)]
    pub media_timestamp: Option<u64>,
    #[serde(rename = "ext", default)]
    pub media_extension: Option<String>,
    #[serde(rename = "fsize", default)]
    pub media_byte_size: Option<u64>,
    /// Original upload name, informational only.
    #[serde(default)]
    pub filename: Option<String>,
}

impl PostRecord {
    /// Attachment file name (`{tim}{ext}`) when the post carries media.
    #[must_use]
    pub fn media_file_name(&self) -> Option<String> {
        match (self.media_timestamp, self.media_extension.as_deref()) {
            (Some(tim), Some(ext)) if !ext.is_empty() => Some(format!("{tim}{ext}")),
            _ => None,
        }
    }

    #[must_use]
    pub fn has_media(&self) -> bool {
        self.media_file_name().is_some()
    }
}

impl PostList {
    /// Posts carrying an attachment, in thread order.
    pub fn media_posts(&self) -> impl Iterator<Item = &PostRecord> {
        self.posts.iter().filter(|p| p.has_media())
    }

    #[must_use]
    pub fn media_count(&self) -> usize {
        self.media_posts().count()
    }

    /// Sum of the reported attachment sizes in bytes.
    #[must_use]
    pub fn total_media_size(&self) -> u64 {
        self.media_posts().filter_map(|p| p.media_byte_size).sum()
    }

    #[must_use]
    pub fn find(&self, post_id: u64) -> Option<&PostRecord> {
        self.posts.iter().find(|p| p.post_id == post_id)
    }
}

/// An attachment to mirror, computed fresh on every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub post_id: u64,
    pub source_path: PathBuf,
    /// Set only when the source format gets converted.
    pub target_path: Option<PathBuf>,
    pub remote_url: String,
}

/// Resolve a post into its media item, or `None` for a text-only post.
///
/// `transcode` selects whether a target path is derived for convertible
/// sources.
#[must_use]
pub fn resolve(
    thread: &ThreadIdentity,
    archive_dir: &Path,
    media_base: &str,
    post: &PostRecord,
    transcode: bool,
) -> Option<MediaItem> {
    let file_name = post.media_file_name()?;
    let source_path = archive_dir.join(&file_name);

    let target_path = if transcode && needs_transcode(post.media_extension.as_deref()) {
        post.media_timestamp
            .map(|tim| archive_dir.join(format!("{tim}.{TRANSCODE_TARGET_EXT}")))
            .filter(|target| *target != source_path)
    } else {
        None
    };

    Some(MediaItem {
        post_id: post.post_id,
        remote_url: thread.media_url(media_base, &file_name),
        source_path,
        target_path,
    })
}

/// Whether a media extension is one the converter normalizes.
#[must_use]
pub fn needs_transcode(extension: Option<&str>) -> bool {
    extension.is_some_and(|ext| ext.eq_ignore_ascii_case(TRANSCODE_SOURCE_EXT))
}
