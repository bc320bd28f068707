//! Integration tests for the HTTP download client.
//!
//! These tests verify streaming transfers into date-partitioned destinations
//! with mock HTTP servers.

use archiver_core::download::{DownloadError, HttpClient, destination_path};
use chrono::{TimeZone, Utc};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper to create a mock server with a file endpoint.
async fn setup_mock_file(path_str: &str, content: &[u8]) -> MockServer {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(path_str))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .mount(&mock_server)
        .await;

    mock_server
}

#[tokio::test]
async fn test_download_full_flow_preserves_content() {
    // Setup
    let content: Vec<u8> = (0..=255u8).cycle().take(3 * 1024 * 1024).collect();
    let mock_server = setup_mock_file("/attachments/1/2/big.png", &content).await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let timestamp = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
    let dest = destination_path(temp_dir.path(), &timestamp, "carol", "big.png", None);

    // Execute
    let client = HttpClient::new();
    let url = format!("{}/attachments/1/2/big.png", mock_server.uri());
    let written = client.download_to_path(&url, &dest, None).await;

    // Verify
    assert_eq!(written.unwrap(), content.len() as u64);
    assert!(dest.starts_with(temp_dir.path().join("2023/12/31")));
    let downloaded_content = std::fs::read(&dest).expect("should read file");
    assert_eq!(downloaded_content, content, "Downloaded content should match original");
}

#[tokio::test]
async fn test_download_handles_500_error() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/broken.png"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let dest = temp_dir.path().join("broken.png");
    let url = format!("{}/broken.png", mock_server.uri());
    let result = HttpClient::new().download_to_path(&url, &dest, None).await;

    match result {
        Err(DownloadError::HttpStatus {
            status,
            url: err_url,
        }) => {
            assert_eq!(status, 500);
            assert!(err_url.contains("/broken.png"));
        }
        other => panic!("Expected HttpStatus(500), got: {other:?}"),
    }
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_download_declared_length_over_limit_rejected_before_write() {
    let mock_server = setup_mock_file("/huge.mp4", &[1u8; 2048]).await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let dest = temp_dir.path().join("nested/huge.mp4");

    let url = format!("{}/huge.mp4", mock_server.uri());
    let result = HttpClient::new().download_to_path(&url, &dest, Some(1000)).await;

    assert!(matches!(
        result,
        Err(DownloadError::TooLarge { limit: 1000, .. })
    ));
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_download_client_is_reusable() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    for i in 1..=3 {
        Mock::given(method("GET"))
            .and(path(format!("/file{i}.jpg")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(format!("content {i}")))
            .mount(&mock_server)
            .await;
    }

    let client = HttpClient::new();
    for i in 1..=3 {
        let url = format!("{}/file{i}.jpg", mock_server.uri());
        let dest = temp_dir.path().join(format!("file{i}.jpg"));
        client.download_to_path(&url, &dest, None).await.unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), format!("content {i}"));
    }
}

#[tokio::test]
async fn test_download_into_unwritable_location_fails_with_io() {
    let mock_server = setup_mock_file("/a.png", b"png").await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    // A regular file where a directory is expected.
    let blocker = temp_dir.path().join("blocker");
    std::fs::write(&blocker, b"x").unwrap();

    let url = format!("{}/a.png", mock_server.uri());
    let result = HttpClient::new()
        .download_to_path(&url, &blocker.join("a.png"), None)
        .await;

    assert!(matches!(result, Err(DownloadError::Io { .. })));
}
