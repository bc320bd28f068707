//! HTTP client wrapper for streaming attachments to disk.
//!
//! This module provides the `HttpClient` struct which handles streaming
//! downloads with proper timeout configuration and error handling.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use crate::user_agent;

/// HTTP client for downloading attachments with streaming support.
///
/// This client is designed to be created once and shared by every download
/// task, taking advantage of connection pooling.
///
/// # Example
///
/// ```no_run
/// use archiver_core::download::HttpClient;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new();
/// let bytes = client
///     .download_to_path("https://cdn.example.com/a.png", Path::new("./a.png"), None)
///     .await?;
/// println!("wrote {bytes} bytes");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes (for large videos)
    /// - Gzip decompression: enabled
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(user_agent::default_download_user_agent())
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Streams `url` into the file at `destination`, returning bytes written.
    ///
    /// Parent directories are created as needed. The body is streamed into a
    /// uniquely named sibling of `destination` and linked into place only once
    /// complete, so an existing file is never overwritten and a failed transfer
    /// never leaves a partial file at `destination`. When `limit` is set and the
    /// body grows past it, the transfer is aborted.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if:
    /// - The URL is invalid
    /// - The request fails (network error, timeout)
    /// - The server returns a non-success status
    /// - The body exceeds `limit`
    /// - A file already exists at `destination` (`DownloadError::AlreadyExists`)
    /// - Creating directories or writing to disk fails
    #[must_use = "download result contains the number of bytes written"]
    #[instrument(skip(self, destination), fields(url = %url, path = %destination.display()))]
    pub async fn download_to_path(
        &self,
        url: &str,
        destination: &Path,
        limit: Option<u64>,
    ) -> Result<u64, DownloadError> {
        debug!("starting download");

        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        if let (Some(limit), Some(declared)) = (limit, response.content_length())
            && declared > limit
        {
            return Err(DownloadError::too_large(url, limit));
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        let partial = partial_path(destination);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&partial)
            .await
            .map_err(|e| DownloadError::io(&partial, e))?;

        let stream_result = stream_to_file(&mut file, response, url, &partial, limit).await;
        drop(file);

        let result = match stream_result {
            Ok(bytes) => publish(&partial, destination).await.map(|()| bytes),
            Err(error) => Err(error),
        };

        if let Err(e) = tokio::fs::remove_file(&partial).await
            && e.kind() != ErrorKind::NotFound
        {
            debug!(error = %e, path = %partial.display(), "failed to remove partial file");
        }

        let bytes_written = result?;
        info!(bytes = bytes_written, "download complete");
        Ok(bytes_written)
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

/// Hidden, uniquely named sibling of `destination` that receives the body.
fn partial_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map_or_else(|| "download".into(), |n| n.to_string_lossy());
    destination.with_file_name(format!(".{name}.{:016x}.part", rand::random::<u64>()))
}

/// Links the finished `partial` file to `destination` without replacing an
/// existing file there.
async fn publish(partial: &Path, destination: &Path) -> Result<(), DownloadError> {
    match tokio::fs::hard_link(partial, destination).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            Err(DownloadError::already_exists(destination))
        }
        Err(e) => Err(DownloadError::io(destination, e)),
    }
}

/// Streams response body to file, returning bytes written.
///
/// This is extracted to enable cleanup on error in the caller.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
    limit: Option<u64>,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;

        bytes_written += chunk.len() as u64;
        if let Some(limit) = limit
            && bytes_written > limit
        {
            return Err(DownloadError::too_large(url, limit));
        }

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}
