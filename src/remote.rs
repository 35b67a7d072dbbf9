//! HTTP access to the thread API and the media host.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, trace};

use crate::archive::ValidationSnapshot;
use crate::config::Config;
use crate::constants::ARCHIVER_USER_AGENT;
use crate::media::PostList;
use crate::thread::ThreadIdentity;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned status {status}")]
    Status { url: String, status: StatusCode },
    #[error("{url} did not report a content length")]
    MissingLength { url: String },
    #[error("failed to parse post list from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A freshly fetched post list: the raw payload for the on-disk snapshot and
/// its parsed form for the media pass.
#[derive(Debug, Clone)]
pub struct FetchedPostList {
    pub raw: Vec<u8>,
    pub posts: PostList,
}

/// Shared HTTP client bound to the configured API and media hosts.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: Client,
    api_base: String,
    media_base: String,
}

impl RemoteClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let http = build_http_client(config.http_timeout)?;
        Ok(Self::with_client(
            http,
            config.api_base.clone(),
            config.media_base.clone(),
        ))
    }

    #[must_use]
    pub fn with_client(http: Client, api_base: String, media_base: String) -> Self {
        Self {
            http,
            api_base,
            media_base,
        }
    }

    #[must_use]
    pub fn http(&self) -> &Client {
        &self.http
    }

    #[must_use]
    pub fn media_base(&self) -> &str {
        &self.media_base
    }

    /// HEAD the thread's API resource and extract its cache validators.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure or a non-success status.
    pub async fn fetch_validators(
        &self,
        thread: &ThreadIdentity,
    ) -> Result<ValidationSnapshot, FetchError> {
        let url = thread.api_url(&self.api_base);
        trace!(url = %url, "Fetching thread validators");

        let response = self
            .http
            .head(&url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.clone(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url,
                status: response.status(),
            });
        }

        let headers = normalize_headers(response.headers());
        Ok(ValidationSnapshot {
            etag: headers.get("etag").cloned(),
            last_modified: headers.get("last-modified").cloned(),
            content_length: headers
                .get("content-length")
                .and_then(|v| v.trim().parse().ok()),
            recorded_at: None,
        })
    }

    /// GET and parse the thread's post list.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, a non-success status, or a
    /// payload that is not a post list.
    pub async fn fetch_post_list(
        &self,
        thread: &ThreadIdentity,
    ) -> Result<FetchedPostList, FetchError> {
        let url = thread.api_url(&self.api_base);
        debug!(url = %url, "Fetching post list");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.clone(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url,
                status: response.status(),
            });
        }

        let raw = response
            .bytes()
            .await
            .map_err(|source| FetchError::Request {
                url: url.clone(),
                source,
            })?
            .to_vec();
        let posts = serde_json::from_slice(&raw).map_err(|source| FetchError::Parse {
            url: url.clone(),
            source,
        })?;

        Ok(FetchedPostList { raw, posts })
    }

    /// Byte length the remote reports for `url`, via a metadata-only request.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, a non-success status, or a
    /// response without a usable `content-length`.
    pub async fn remote_size(&self, url: &str) -> Result<u64, FetchError> {
        let response = self
            .http
            .head(url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        normalize_headers(response.headers())
            .get("content-length")
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| FetchError::MissingLength {
                url: url.to_string(),
            })
    }
}

/// Build the HTTP client used for every request of a run.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn build_http_client(timeout: Duration) -> Result<Client, FetchError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(ARCHIVER_USER_AGENT)
        .build()
        .map_err(FetchError::Client)
}

/// Lowercase header names and keep the values that are valid strings.
#[must_use]
pub fn normalize_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderName, HeaderValue};

    #[test]
    fn test_normalize_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("etag"),
            HeaderValue::from_static("\"abc\""),
        );
        headers.insert(
            HeaderName::from_static("last-modified"),
            HeaderValue::from_static("Mon, 01 Jan 2024 00:00:00 GMT"),
        );
        headers.insert(
            HeaderName::from_static("x-binary"),
            HeaderValue::from_bytes(b"\xff\xfe").unwrap(),
        );

        let normalized = normalize_headers(&headers);
        assert_eq!(normalized.get("etag").map(String::as_str), Some("\"abc\""));
        assert!(normalized.contains_key("last-modified"));
        assert!(!normalized.contains_key("x-binary"));
    }
}
