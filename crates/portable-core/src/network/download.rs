//! Archive downloads with progress reporting.
//!
//! Provides:
//! - Streaming download to a `.part` temp file, then atomic rename
//! - Progress callbacks throttled to one update per second
//! - Retry with linear backoff for transient failures
//! - A per-chunk deadline, so a stalled stream fails instead of hanging
//! - Size verification against the Content-Length header
//!
//! A failed attempt always deletes its partial file, so retries start
//! from a clean slate and no `.part` debris survives an error.

use crate::config::NetworkConfig;
use crate::error::{PortableError, Result};
use crate::network::client::HttpClient;
use crate::network::retry::{retry_async, RetryConfig};
use futures::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Progress information for a download.
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    /// Bytes downloaded so far.
    pub bytes_downloaded: u64,
    /// Total bytes (if known).
    pub total_bytes: Option<u64>,
    /// Percentage complete (0-100).
    pub percent: Option<f64>,
}

impl DownloadProgress {
    fn new(bytes_downloaded: u64, total_bytes: Option<u64>) -> Self {
        let percent = total_bytes.map(|total| {
            if total > 0 {
                (bytes_downloaded as f64 / total as f64) * 100.0
            } else {
                0.0
            }
        });

        Self {
            bytes_downloaded,
            total_bytes,
            percent,
        }
    }
}

/// File downloader used for runtime archives.
pub struct Downloader {
    http: Arc<HttpClient>,
    temp_suffix: String,
    chunk_timeout: Duration,
}

impl Downloader {
    pub fn new() -> Result<Self> {
        Ok(Self::with_client(Arc::new(HttpClient::new()?)))
    }

    pub fn with_client(http: Arc<HttpClient>) -> Self {
        Self {
            http,
            temp_suffix: NetworkConfig::DOWNLOAD_TEMP_SUFFIX.to_string(),
            chunk_timeout: NetworkConfig::REQUEST_TIMEOUT,
        }
    }

    /// Override the deadline applied between chunks of the body.
    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = timeout;
        self
    }

    /// Download a file, reporting progress through an optional channel.
    ///
    /// The body streams into `{destination}.part` and is renamed into
    /// place only after the size check passes. Returns the number of
    /// bytes written.
    pub async fn download(
        &self,
        url: &str,
        destination: &Path,
        progress_tx: Option<mpsc::Sender<DownloadProgress>>,
    ) -> Result<u64> {
        if let Some(parent) = destination.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| PortableError::io_with_path(e, parent))?;
            }
        }

        let temp_path = PathBuf::from(format!("{}{}", destination.display(), self.temp_suffix));

        let result = self.do_download(url, &temp_path, progress_tx).await;

        match result {
            Ok(bytes) => {
                std::fs::rename(&temp_path, destination).map_err(|e| {
                    let _ = std::fs::remove_file(&temp_path);
                    PortableError::io_with_path(e, destination)
                })?;

                info!("Downloaded {} bytes to {}", bytes, destination.display());
                Ok(bytes)
            }
            Err(e) => {
                let _ = std::fs::remove_file(&temp_path);
                Err(e)
            }
        }
    }

    /// Download a file, retrying transient failures with linear backoff.
    pub async fn download_with_retry(
        &self,
        url: &str,
        destination: &Path,
        max_attempts: u32,
        progress_tx: Option<mpsc::Sender<DownloadProgress>>,
    ) -> Result<u64> {
        let retry_config = RetryConfig::new().with_max_attempts(max_attempts);

        let (result, stats) = retry_async(
            &retry_config,
            || self.download(url, destination, progress_tx.clone()),
            |e: &PortableError| e.is_retryable(),
        )
        .await;

        if stats.attempts > 1 {
            debug!(
                "Download finished after {} attempts (total delay: {:?})",
                stats.attempts, stats.total_delay
            );
        }

        result
    }

    async fn do_download(
        &self,
        url: &str,
        temp_path: &Path,
        progress_tx: Option<mpsc::Sender<DownloadProgress>>,
    ) -> Result<u64> {
        let response = self.http.get_streaming(url).await?;
        let status = response.status();

        if !status.is_success() {
            return Err(PortableError::DownloadFailed {
                url: url.to_string(),
                message: format!("server responded with status {status}"),
            });
        }

        let total_bytes = response.content_length();
        let mut file = std::fs::File::create(temp_path)
            .map_err(|e| PortableError::io_with_path(e, temp_path))?;

        let mut bytes_downloaded: u64 = 0;
        let mut last_progress_update = Instant::now();
        let mut stream = response.bytes_stream();

        if let Some(ref tx) = progress_tx {
            let _ = tx.send(DownloadProgress::new(0, total_bytes)).await;
        }

        // A server that stalls mid-body must not hang the download;
        // the timeout error is retryable, so backoff gets its turn.
        while let Some(chunk_result) = tokio::time::timeout(self.chunk_timeout, stream.next())
            .await
            .map_err(|_| PortableError::Timeout(self.chunk_timeout))?
        {
            let chunk = chunk_result.map_err(|e| PortableError::Network {
                message: format!("Error reading download stream: {e}"),
                source: Some(e),
            })?;

            file.write_all(&chunk)
                .map_err(|e| PortableError::io_with_path(e, temp_path))?;

            bytes_downloaded += chunk.len() as u64;

            if last_progress_update.elapsed() >= NetworkConfig::PROGRESS_INTERVAL {
                if let Some(ref tx) = progress_tx {
                    let _ = tx
                        .send(DownloadProgress::new(bytes_downloaded, total_bytes))
                        .await;
                }
                last_progress_update = Instant::now();
            }
        }

        file.flush()
            .map_err(|e| PortableError::io_with_path(e, temp_path))?;
        drop(file);

        // Truncated bodies must not be renamed into place
        verify_integrity(temp_path, total_bytes)?;

        if let Some(ref tx) = progress_tx {
            let _ = tx
                .send(DownloadProgress::new(bytes_downloaded, total_bytes))
                .await;
        }

        Ok(bytes_downloaded)
    }
}

/// Check a downloaded file on disk, returning its size.
///
/// A missing file, or a size differing from `expected_size` when one
/// is given, is an [`PortableError::Integrity`] failure.
pub fn verify_integrity(path: &Path, expected_size: Option<u64>) -> Result<u64> {
    let metadata = std::fs::metadata(path).map_err(|_| PortableError::Integrity {
        path: path.to_path_buf(),
        message: "file does not exist".to_string(),
    })?;

    let size = metadata.len();
    if let Some(expected) = expected_size {
        if size != expected {
            return Err(PortableError::Integrity {
                path: path.to_path_buf(),
                message: format!("expected {expected} bytes, found {size}"),
            });
        }
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve canned HTTP responses on a local port. Each connection
    /// consumes the next response in the list; the last one repeats.
    async fn spawn_server(responses: Vec<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let counter = Arc::new(AtomicU32::new(0));

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let responses = responses.clone();
                let counter = counter.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let idx = counter.fetch_add(1, Ordering::SeqCst) as usize;
                    let response = &responses[idx.min(responses.len() - 1)];
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{addr}")
    }

    fn ok_response(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    }

    #[tokio::test]
    async fn test_download_writes_file_and_removes_temp() {
        let base = spawn_server(vec![ok_response("hello archive")]).await;
        let tmp = tempfile::TempDir::new().unwrap();
        let dest = tmp.path().join("archive.bin");

        let downloader = Downloader::new().unwrap();
        let bytes = downloader
            .download(&format!("{base}/file"), &dest, None)
            .await
            .unwrap();

        assert_eq!(bytes, 13);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "hello archive");
        assert!(!tmp.path().join("archive.bin.part").exists());
    }

    #[tokio::test]
    async fn test_download_failure_cleans_partial_file() {
        let base = spawn_server(vec![
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
        ])
        .await;
        let tmp = tempfile::TempDir::new().unwrap();
        let dest = tmp.path().join("missing.bin");

        let downloader = Downloader::new().unwrap();
        let err = downloader
            .download(&format!("{base}/file"), &dest, None)
            .await
            .unwrap_err();

        assert!(matches!(err, PortableError::DownloadFailed { .. }));
        assert!(!dest.exists());
        assert!(!tmp.path().join("missing.bin.part").exists());
    }

    #[tokio::test]
    async fn test_download_retries_transient_failure() {
        let base = spawn_server(vec![
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_string(),
            ok_response("eventually fine"),
        ])
        .await;
        let tmp = tempfile::TempDir::new().unwrap();
        let dest = tmp.path().join("retry.bin");

        let downloader = Downloader::new().unwrap();
        let bytes = downloader
            .download_with_retry(&format!("{base}/file"), &dest, 3, None)
            .await
            .unwrap();

        assert_eq!(bytes, 15);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "eventually fine");
    }

    #[tokio::test]
    async fn test_download_fails_when_stream_stalls() {
        // Headers and a few body bytes arrive, then the server goes
        // silent while keeping the connection open
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\npartial")
                .await;
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });

        let tmp = tempfile::TempDir::new().unwrap();
        let dest = tmp.path().join("stalled.bin");

        let downloader = Downloader::new()
            .unwrap()
            .with_chunk_timeout(std::time::Duration::from_millis(200));
        let err = downloader
            .download(&format!("http://{addr}/file"), &dest, None)
            .await
            .unwrap_err();

        assert!(matches!(err, PortableError::Timeout(_)));
        assert!(err.is_retryable());
        assert!(!dest.exists());
        assert!(!tmp.path().join("stalled.bin.part").exists());
    }

    #[tokio::test]
    async fn test_download_follows_redirect() {
        // First server redirects to a second one serving the body
        let target = spawn_server(vec![ok_response("redirected body")]).await;
        let redirect = spawn_server(vec![format!(
            "HTTP/1.1 302 Found\r\nLocation: {target}/real\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        )])
        .await;
        let tmp = tempfile::TempDir::new().unwrap();
        let dest = tmp.path().join("moved.bin");

        let downloader = Downloader::new().unwrap();
        let bytes = downloader
            .download(&format!("{redirect}/file"), &dest, None)
            .await
            .unwrap();

        assert_eq!(bytes, 15);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "redirected body");
    }

    #[test]
    fn test_verify_integrity() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("payload.bin");
        std::fs::write(&path, b"12345").unwrap();

        assert_eq!(verify_integrity(&path, Some(5)).unwrap(), 5);
        assert_eq!(verify_integrity(&path, None).unwrap(), 5);
        assert!(matches!(
            verify_integrity(&path, Some(6)),
            Err(PortableError::Integrity { .. })
        ));
        assert!(matches!(
            verify_integrity(&tmp.path().join("absent"), None),
            Err(PortableError::Integrity { .. })
        ));
    }

    #[tokio::test]
    async fn test_progress_reports_totals() {
        let base = spawn_server(vec![ok_response("0123456789")]).await;
        let tmp = tempfile::TempDir::new().unwrap();
        let dest = tmp.path().join("progress.bin");

        let (tx, mut rx) = mpsc::channel(16);
        let downloader = Downloader::new().unwrap();
        downloader
            .download(&format!("{base}/file"), &dest, Some(tx))
            .await
            .unwrap();

        let mut last = None;
        while let Some(update) = rx.recv().await {
            last = Some(update);
        }
        let last = last.unwrap();
        assert_eq!(last.bytes_downloaded, 10);
        assert_eq!(last.total_bytes, Some(10));
        assert_eq!(last.percent, Some(100.0));
    }
}
