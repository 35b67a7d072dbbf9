//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thread_archiver::archiver::{Converter, TranscodeError};
use thread_archiver::remote::{build_http_client, RemoteClient};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const BOARD: &str = "g";
pub const THREAD_ID: u64 = 42;

pub fn api_path() -> String {
    format!("/{BOARD}/thread/{THREAD_ID}.json")
}

pub fn media_path(file_name: &str) -> String {
    format!("/media/{BOARD}/{file_name}")
}

pub fn client_for(server: &MockServer) -> RemoteClient {
    let http = build_http_client(Duration::from_secs(5)).expect("Failed to build client");
    RemoteClient::with_client(http, server.uri(), format!("{}/media", server.uri()))
}

/// Serve `body` at `route` for GET, and its length for HEAD.
///
/// The HEAD response carries a body of the same size so the server reports
/// the matching `content-length`.
pub async fn mount_file(server: &MockServer, route: &str, body: &[u8]) {
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

/// Serve the thread's post list, with an `etag` on the HEAD response.
pub async fn mount_thread(server: &MockServer, posts_json: &str, etag: &str) {
    Mock::given(method("HEAD"))
        .and(path(api_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", etag)
                .set_body_string(posts_json),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(api_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", etag)
                .set_body_string(posts_json),
        )
        .mount(server)
        .await;
}

/// A post list with one attachment per `(post id, tim, ext, size)`.
pub fn posts_json(media: &[(u64, u64, &str, u64)]) -> String {
    let mut posts = vec![serde_json::json!({ "no": THREAD_ID, "com": "op" })];
    posts.extend(media.iter().map(|(no, tim, ext, fsize)| {
        serde_json::json!({
            "no": no,
            "tim": tim,
            "ext": ext,
            "fsize": fsize,
            "filename": format!("upload-{no}"),
        })
    }));
    serde_json::json!({ "posts": posts }).to_string()
}

/// Converter double that records its calls and writes a fixed payload.
#[derive(Default)]
pub struct RecordingConverter {
    calls: Mutex<Vec<(PathBuf, PathBuf)>>,
    fail: AtomicBool,
}

impl RecordingConverter {
    pub const OUTPUT: &'static [u8] = b"converted";

    pub fn failing() -> Self {
        let converter = Self::default();
        converter.fail.store(true, Ordering::SeqCst);
        converter
    }

    pub fn calls(&self) -> Vec<(PathBuf, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Converter for RecordingConverter {
    async fn convert(&self, source: &Path, output: &Path) -> Result<(), TranscodeError> {
        self.calls
            .lock()
            .unwrap()
            .push((source.to_path_buf(), output.to_path_buf()));

        if self.fail.load(Ordering::SeqCst) {
            // Leave a partial file behind, like an interrupted converter.
            std::fs::write(output, b"partial").unwrap();
            return Err(TranscodeError::Failed {
                code: Some(1),
                stderr: "Invalid data found when processing input".to_string(),
            });
        }

        std::fs::write(output, Self::OUTPUT).unwrap();
        Ok(())
    }
}
