//! Atomic file downloads.
//!
//! Bodies are streamed into `<target>.part`, flushed and synced, then renamed
//! onto the target. A failed, timed out or cancelled attempt removes its temp
//! file, so a file at a target path is always a complete download.

use crate::cancel::CancellationToken;
use crate::config::NetworkConfig;
use crate::network::client::HttpClient;
use crate::network::retry::{retry_async, RetryConfig, RetryStats};
use crate::{FetchError, Result};
use futures::StreamExt;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Downloads single files with retry and cancellation.
#[derive(Debug, Clone)]
pub struct Downloader {
    http: HttpClient,
    retry_client_errors: bool,
}

impl Downloader {
    /// Create a downloader that retries every non-success status.
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            retry_client_errors: true,
        }
    }

    /// Enable or disable retries of 4xx statuses.
    pub fn with_client_error_retries(mut self, retry: bool) -> Self {
        self.retry_client_errors = retry;
        self
    }

    /// Whether `err` earns another attempt under this downloader's policy.
    pub fn should_retry(&self, err: &FetchError) -> bool {
        err.should_retry(self.retry_client_errors)
    }

    /// Temp path used while `destination` is being written.
    pub fn temp_path(destination: &Path) -> PathBuf {
        let mut name = destination
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(NetworkConfig::DOWNLOAD_TEMP_SUFFIX);
        destination.with_file_name(name)
    }

    /// Download `url` to `destination` once.
    ///
    /// Returns the number of bytes written.
    pub async fn download(
        &self,
        url: &str,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        cancel.check()?;

        let temp_path = Self::temp_path(destination);
        let result = self.download_to_temp(url, &temp_path, cancel).await;

        match result {
            Ok(bytes) => {
                if let Err(e) = fs::rename(&temp_path, destination).await {
                    remove_temp(&temp_path).await;
                    return Err(FetchError::Io {
                        message: format!("Failed to move download to final destination: {}", e),
                        path: Some(destination.to_path_buf()),
                        source: Some(e),
                    });
                }
                debug!("Downloaded {} bytes to {}", bytes, destination.display());
                Ok(bytes)
            }
            Err(e) => {
                remove_temp(&temp_path).await;
                Err(e)
            }
        }
    }

    /// Download with retries on transient failures.
    ///
    /// Cancellation is never retried; neither are 4xx statuses when client
    /// error retries are off.
    pub async fn download_with_retry(
        &self,
        url: &str,
        destination: &Path,
        retry_config: &RetryConfig,
        cancel: &CancellationToken,
    ) -> (Result<u64>, RetryStats) {
        retry_async(
            retry_config,
            cancel,
            |attempt| {
                if attempt > 0 {
                    debug!("Retrying {} (attempt {})", url, attempt + 1);
                }
                self.download(url, destination, cancel)
            },
            |e: &FetchError| self.should_retry(e) && !cancel.is_cancelled(),
        )
        .await
    }

    async fn download_to_temp(
        &self,
        url: &str,
        temp_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let response = tokio::select! {
            response = self.http.get(url) => response?,
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
        };

        let mut file = fs::File::create(temp_path)
            .await
            .map_err(|e| FetchError::Io {
                message: format!("Failed to create temp file: {}", e),
                path: Some(temp_path.to_path_buf()),
                source: Some(e),
            })?;

        let mut bytes_downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                next = stream.next() => next,
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            };
            let Some(chunk_result) = next else { break };

            let chunk = chunk_result.map_err(|e| FetchError::from_reqwest(e, self.http.timeout()))?;

            file.write_all(&chunk).await.map_err(|e| FetchError::Io {
                message: format!("Failed to write to temp file: {}", e),
                path: Some(temp_path.to_path_buf()),
                source: Some(e),
            })?;
            bytes_downloaded += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| FetchError::io_with_path(e, temp_path))?;
        file.sync_all()
            .await
            .map_err(|e| FetchError::io_with_path(e, temp_path))?;

        Ok(bytes_downloaded)
    }
}

async fn remove_temp(temp_path: &Path) {
    match fs::remove_file(temp_path).await {
        Ok(()) => debug!("Removed temp file {}", temp_path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove temp file {}: {}", temp_path.display(), e),
    }
}
