//! Thread identity and the paths/URLs derived from it.

use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;
use url::Url;

static THREAD_PATH: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
    Regex::new(r"^/([A-Za-z0-9_]+)/thread/([^/]+)").expect("thread path pattern is valid")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ThreadUrlError {
    #[error("not a valid URL: {0}")]
    InvalidUrl(String),
    #[error("URL does not point at a thread: {0}")]
    NotAThread(String),
    #[error("thread id is not numeric: {0}")]
    BadThreadId(String),
}

/// Board name plus numeric thread id. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadIdentity {
    board: String,
    thread_id: u64,
}

/// A thread URL broken into its identity and optional linked post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadUrl {
    pub identity: ThreadIdentity,
    pub post_id: Option<u64>,
}

impl ThreadIdentity {
    #[must_use]
    pub fn new(board: impl Into<String>, thread_id: u64) -> Self {
        Self {
            board: board.into(),
            thread_id,
        }
    }

    #[must_use]
    pub fn board(&self) -> &str {
        &self.board
    }

    #[must_use]
    pub fn thread_id(&self) -> u64 {
        self.thread_id
    }

    /// Parse a thread URL such as `https://boards.example.org/g/thread/123#p456`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is malformed or does not name a thread.
    pub fn parse_url(input: &str) -> Result<ThreadUrl, ThreadUrlError> {
        let url = Url::parse(input).map_err(|_| ThreadUrlError::InvalidUrl(input.to_string()))?;
        let captures = THREAD_PATH
            .captures(url.path())
            .ok_or_else(|| ThreadUrlError::NotAThread(input.to_string()))?;

        let board = captures[1].to_string();
        let thread_id = captures[2]
            .parse::<u64>()
            .map_err(|_| ThreadUrlError::BadThreadId(captures[2].to_string()))?;

        // Post anchors look like `#p123456`.
        let post_id = url
            .fragment()
            .and_then(|f| f.strip_prefix('p'))
            .and_then(|id| id.parse().ok());

        Ok(ThreadUrl {
            identity: Self::new(board, thread_id),
            post_id,
        })
    }

    /// JSON endpoint holding the thread's post list.
    #[must_use]
    pub fn api_url(&self, api_base: &str) -> String {
        format!(
            "{}/{}/thread/{}.json",
            api_base.trim_end_matches('/'),
            self.board,
            self.thread_id
        )
    }

    /// URL of an attachment file on the media host.
    #[must_use]
    pub fn media_url(&self, media_base: &str, file_name: &str) -> String {
        format!(
            "{}/{}/{}",
            media_base.trim_end_matches('/'),
            self.board,
            file_name
        )
    }

    /// Local directory holding this thread's archive.
    #[must_use]
    pub fn archive_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.board).join(self.thread_id.to_string())
    }
}

impl fmt::Display for ThreadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.board, self.thread_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url() {
        let parsed = ThreadIdentity::parse_url("https://boards.4channel.org/g/thread/76759434").unwrap();
        assert_eq!(parsed.identity, ThreadIdentity::new("g", 76_759_434));
        assert_eq!(parsed.post_id, None);
    }

    #[test]
    fn test_parse_url_with_slug_and_post() {
        let parsed =
            ThreadIdentity::parse_url("https://boards.4chan.org/wsg/thread/1234/some-slug#p5678")
                .unwrap();
        assert_eq!(parsed.identity.board(), "wsg");
        assert_eq!(parsed.identity.thread_id(), 1234);
        assert_eq!(parsed.post_id, Some(5678));
    }

    #[test]
    fn test_parse_url_errors() {
        assert!(matches!(
            ThreadIdentity::parse_url("not a url"),
            Err(ThreadUrlError::InvalidUrl(_))
        ));
        assert!(matches!(
            ThreadIdentity::parse_url("https://example.com/g/catalog"),
            Err(ThreadUrlError::NotAThread(_))
        ));
        assert!(matches!(
            ThreadIdentity::parse_url("https://example.com/g/thread/abc"),
            Err(ThreadUrlError::BadThreadId(_))
        ));
    }

    #[test]
    fn test_derived_locations() {
        let thread = ThreadIdentity::new("g", 42);
        assert_eq!(
            thread.api_url("https://a.4cdn.org/"),
            "https://a.4cdn.org/g/thread/42.json"
        );
        assert_eq!(
            thread.media_url("https://i.4cdn.org", "1600000000000.webm"),
            "https://i.4cdn.org/g/1600000000000.webm"
        );
        assert_eq!(
            thread.archive_dir(Path::new("archives")),
            PathBuf::from("archives/g/42")
        );
        assert_eq!(thread.to_string(), "/g/42");
    }
}
