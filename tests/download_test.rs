//! Integration tests for size-checked media downloads.

mod common;

use common::{client_for, media_path, mount_file};
use tempfile::TempDir;
use thread_archiver::archiver::{download, DownloadError, DownloadStatus};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_download_new_file() {
    let server = MockServer::start().await;
    mount_file(&server, &media_path("1700.jpg"), b"image-bytes").await;

    let temp = TempDir::new().unwrap();
    let local = temp.path().join("1700.jpg");
    let url = format!("{}{}", server.uri(), media_path("1700.jpg"));

    let status = download(&client_for(&server), &url, &local).await.unwrap();
    assert_eq!(status, DownloadStatus::Downloaded { bytes: 11 });
    assert_eq!(std::fs::read(&local).unwrap(), b"image-bytes");
}

#[tokio::test]
async fn test_complete_file_is_not_fetched_again() {
    let server = MockServer::start().await;
    let route = media_path("1700.jpg");
    Mock::given(method("HEAD"))
        .and(path(route.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"image-bytes".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(route.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"image-bytes".to_vec()))
        .expect(0)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let local = temp.path().join("1700.jpg");
    std::fs::write(&local, b"local-bytes").unwrap();
    let url = format!("{}{route}", server.uri());

    let status = download(&client_for(&server), &url, &local).await.unwrap();
    assert_eq!(status, DownloadStatus::AlreadyComplete { bytes: 11 });
    // Equal size means complete; the local contents are left alone.
    assert_eq!(std::fs::read(&local).unwrap(), b"local-bytes");
}

#[tokio::test]
async fn test_truncated_file_is_replaced() {
    let server = MockServer::start().await;
    mount_file(&server, &media_path("1700.jpg"), b"image-bytes").await;

    let temp = TempDir::new().unwrap();
    let local = temp.path().join("1700.jpg");
    std::fs::write(&local, b"image").unwrap();
    let url = format!("{}{}", server.uri(), media_path("1700.jpg"));

    let status = download(&client_for(&server), &url, &local).await.unwrap();
    assert_eq!(status, DownloadStatus::Downloaded { bytes: 11 });
    assert_eq!(std::fs::read(&local).unwrap(), b"image-bytes");
}

#[tokio::test]
async fn test_missing_remote_file_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let local = temp.path().join("1700.jpg");
    let url = format!("{}{}", server.uri(), media_path("1700.jpg"));

    let err = download(&client_for(&server), &url, &local).await.unwrap_err();
    assert!(matches!(err, DownloadError::Transfer(_)));
    assert!(!local.exists());
}

#[tokio::test]
async fn test_unknown_remote_size_for_existing_file_fails() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let local = temp.path().join("1700.jpg");
    std::fs::write(&local, b"partial").unwrap();
    let url = format!("{}{}", server.uri(), media_path("1700.jpg"));

    let err = download(&client_for(&server), &url, &local).await.unwrap_err();
    assert!(matches!(err, DownloadError::RemoteSize(_)));
    assert_eq!(std::fs::read(&local).unwrap(), b"partial");
}
