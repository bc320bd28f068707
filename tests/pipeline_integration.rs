//! Integration tests for the download pipeline with duplicate detection.
//!
//! These tests drive the full pipeline against mock HTTP servers and a real
//! SQLite digest store on disk.

use std::path::Path;
use std::sync::Arc;

use archiver_core::Database;
use archiver_core::dedup::{
    DisabledHashStore, DuplicateCache, Deduplicator, HashStore, SqliteHashStore, open_hash_store,
};
use archiver_core::download::{
    AttachmentDescriptor, DownloadPipeline, HttpClient, PipelineOutcome, Rejection, SizeBounds,
    SizeClassifier,
};
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

fn descriptor(url: String, filename: &str, content_type: &str, size: u64) -> AttachmentDescriptor {
    AttachmentDescriptor {
        remote_url: url,
        filename: filename.to_string(),
        declared_content_type: Some(content_type.to_string()),
        declared_size_bytes: size,
        author_name: "alice".to_string(),
        event_timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 12, 30, 0).unwrap(),
    }
}

fn files_under(root: &Path) -> Vec<std::path::PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                found.push(path);
            }
        }
    }
    found.sort();
    found
}

async fn sqlite_store(dir: &TempDir) -> SqliteHashStore {
    let url = format!("sqlite:{}", dir.path().join("hashes.db").display());
    SqliteHashStore::new(Database::connect(&url).await.expect("database should open"))
}

#[tokio::test]
async fn test_identical_bytes_twice_second_deleted_and_row_count_unchanged() {
    let content = b"identical image bytes";
    let server = setup_mock_file("/cat.png", content).await;
    let archive = TempDir::new().unwrap();
    let db_dir = TempDir::new().unwrap();

    let store = sqlite_store(&db_dir).await;
    let dedup = Deduplicator::new(DuplicateCache::new(100), Arc::new(store.clone()));
    let pipeline = DownloadPipeline::new(
        HttpClient::new(),
        SizeClassifier::default(),
        archive.path(),
        Some(dedup),
    );
    let url = format!("{}/cat.png", server.uri());

    let first = pipeline
        .process(&descriptor(url.clone(), "cat.png", "image/png", 21))
        .await;
    assert!(matches!(first, PipelineOutcome::Saved { .. }), "{first:?}");
    let rows_after_first = store.count().await.unwrap();
    assert_eq!(rows_after_first, 1);

    let second = pipeline
        .process(&descriptor(url, "cat-again.png", "image/png", 21))
        .await;
    let PipelineOutcome::DuplicateDiscarded { path, .. } = second else {
        panic!("expected duplicate, got {second:?}");
    };
    assert!(!path.exists(), "duplicate should be deleted after hashing");
    assert_eq!(store.count().await.unwrap(), rows_after_first);
    assert_eq!(files_under(archive.path()).len(), 1);
}

#[tokio::test]
async fn test_dedup_disabled_keeps_both_copies() {
    let server = setup_mock_file("/clip.mp4", b"video bytes").await;
    let archive = TempDir::new().unwrap();
    let pipeline = DownloadPipeline::new(
        HttpClient::new(),
        SizeClassifier::default(),
        archive.path(),
        None,
    );
    let url = format!("{}/clip.mp4", server.uri());

    let first = pipeline
        .process(&descriptor(url.clone(), "clip.mp4", "video/mp4", 11))
        .await;
    let second = pipeline
        .process(&descriptor(url, "clip2.mp4", "video/mp4", 11))
        .await;

    assert!(matches!(first, PipelineOutcome::Saved { .. }));
    assert!(matches!(second, PipelineOutcome::Saved { .. }));
    let files = files_under(archive.path());
    assert_eq!(files.len(), 2);
    for file in files {
        assert_eq!(std::fs::read(file).unwrap(), b"video bytes");
    }
}

#[tokio::test]
async fn test_store_remembers_digests_across_restart() {
    let server = setup_mock_file("/meme.gif", b"gif bytes").await;
    let archive = TempDir::new().unwrap();
    let db_dir = TempDir::new().unwrap();
    let url = format!("{}/meme.gif", server.uri());

    {
        let dedup = Deduplicator::new(
            DuplicateCache::new(10),
            Arc::new(sqlite_store(&db_dir).await),
        );
        let pipeline = DownloadPipeline::new(
            HttpClient::new(),
            SizeClassifier::default(),
            archive.path(),
            Some(dedup),
        );
        let outcome = pipeline
            .process(&descriptor(url.clone(), "meme.gif", "image/gif", 9))
            .await;
        assert!(matches!(outcome, PipelineOutcome::Saved { .. }));
    }

    // Fresh process: empty cache, same database.
    let db_url = format!("sqlite:{}", db_dir.path().join("hashes.db").display());
    let store = open_hash_store(Some(&db_url)).await;
    assert!(store.is_enabled());
    let pipeline = DownloadPipeline::new(
        HttpClient::new(),
        SizeClassifier::default(),
        archive.path(),
        Some(Deduplicator::new(DuplicateCache::new(10), store)),
    );
    let outcome = pipeline
        .process(&descriptor(url, "meme-repost.gif", "image/gif", 9))
        .await;

    assert!(
        matches!(outcome, PipelineOutcome::DuplicateDiscarded { .. }),
        "{outcome:?}"
    );
    assert_eq!(files_under(archive.path()).len(), 1);
}

#[tokio::test]
async fn test_unrecognized_type_is_never_requested() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF".to_vec()))
        .expect(0)
        .mount(&server)
        .await;
    let archive = TempDir::new().unwrap();
    let pipeline = DownloadPipeline::new(
        HttpClient::new(),
        SizeClassifier::default(),
        archive.path(),
        None,
    );

    let outcome = pipeline
        .process(&descriptor(
            format!("{}/paper.pdf", server.uri()),
            "paper.pdf",
            "application/pdf",
            4,
        ))
        .await;

    assert!(matches!(
        outcome,
        PipelineOutcome::Rejected(Rejection::NotMedia)
    ));
    assert!(files_under(archive.path()).is_empty());
}

#[tokio::test]
async fn test_small_image_below_minimum_not_written() {
    let server = setup_mock_file("/a.png", &[0u8; 200]).await;
    let archive = TempDir::new().unwrap();
    let classifier = SizeClassifier::new(
        SizeBounds::new(1000, 50 * 1024 * 1024),
        SizeBounds::new(0, 500 * 1024 * 1024),
    );
    let pipeline = DownloadPipeline::new(
        HttpClient::new(),
        classifier,
        archive.path(),
        Some(Deduplicator::new(
            DuplicateCache::new(10),
            Arc::new(DisabledHashStore),
        )),
    );

    let outcome = pipeline
        .process(&descriptor(
            format!("{}/a.png", server.uri()),
            "a.png",
            "image/png",
            200,
        ))
        .await;

    assert!(matches!(outcome, PipelineOutcome::Rejected(_)));
    assert!(files_under(archive.path()).is_empty());
}

#[tokio::test]
async fn test_unreachable_store_degrades_to_cache_only() {
    let server = setup_mock_file("/x.webp", b"webp").await;
    let archive = TempDir::new().unwrap();

    let store = open_hash_store(Some("postgres://nowhere/db")).await;
    assert!(!store.is_enabled());

    let pipeline = DownloadPipeline::new(
        HttpClient::new(),
        SizeClassifier::default(),
        archive.path(),
        Some(Deduplicator::new(DuplicateCache::new(10), store)),
    );
    let url = format!("{}/x.webp", server.uri());

    let first = pipeline
        .process(&descriptor(url.clone(), "x.webp", "image/webp", 4))
        .await;
    let second = pipeline
        .process(&descriptor(url, "y.webp", "image/webp", 4))
        .await;

    assert!(matches!(first, PipelineOutcome::Saved { .. }));
    assert!(matches!(
        second,
        PipelineOutcome::DuplicateDiscarded { .. }
    ));
}
