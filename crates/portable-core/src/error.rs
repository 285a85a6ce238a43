//! Error types for the portable launcher.
//!
//! One enum covers the whole taxonomy so every layer can speak the
//! same `Result<T>`. Variants carry enough context to print a
//! single-line, human-readable message at the CLI boundary.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for launcher operations.
#[derive(Debug, Error)]
pub enum PortableError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    #[error("Integrity check failed for {path}: {message}")]
    Integrity { path: PathBuf, message: String },

    // Archive errors
    #[error("Extraction failed: {message}")]
    ExtractionFailed { message: String },

    #[error("Unsupported archive format: {0}")]
    UnsupportedArchive(String),

    // Platform errors
    #[error("Unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Process errors
    #[error("Another launcher operation is already running (pid {pid}: {command})")]
    AlreadyRunning { pid: u32, command: String },

    #[error("Command `{command}` timed out after {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    #[error("Command `{command}` exited with code {code}")]
    NonZeroExit {
        command: String,
        code: i32,
        stderr_tail: String,
    },

    #[error("Timed out waiting for {what} after {timeout:?}")]
    WaitTimeout { what: String, timeout: Duration },

    // Installation errors
    #[error("Node.js runtime not found at {0}. Run `n8n-portable runtime` to download it")]
    MissingRuntime(PathBuf),

    #[error("Installation failed: {message}")]
    InstallationFailed { message: String },

    #[error("Installation verification failed: {message}")]
    VerificationFailed { message: String },

    // GitHub API errors
    #[error("GitHub API error: {message}")]
    GitHubApi {
        message: String,
        status_code: Option<u16>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for launcher operations.
pub type Result<T> = std::result::Result<T, PortableError>;

impl From<std::io::Error> for PortableError {
    fn from(err: std::io::Error) -> Self {
        PortableError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for PortableError {
    fn from(err: serde_json::Error) -> Self {
        PortableError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for PortableError {
    // Timed-out requests land here too; reqwest's own message names
    // the timeout, and Network is just as retryable.
    fn from(err: reqwest::Error) -> Self {
        PortableError::Network {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl PortableError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        PortableError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Check if this error should trigger a retry.
    ///
    /// Only transient network conditions qualify; extraction and
    /// installation failures are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PortableError::Network { .. }
                | PortableError::Timeout(_)
                | PortableError::DownloadFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PortableError::NonZeroExit {
            command: "npm install".into(),
            code: 2,
            stderr_tail: String::new(),
        };
        assert_eq!(err.to_string(), "Command `npm install` exited with code 2");
    }

    #[tokio::test]
    async fn test_reqwest_timeout_keeps_a_useful_message() {
        use tokio::io::AsyncReadExt;
        use tokio::net::TcpListener;

        // Accept the connection, then never answer
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let reqwest_err = client
            .get(format!("http://{addr}/"))
            .send()
            .await
            .unwrap_err();
        assert!(reqwest_err.is_timeout());

        let err = PortableError::from(reqwest_err);
        assert!(err.is_retryable());
        assert!(!err.to_string().contains("0ns"));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(PortableError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(PortableError::DownloadFailed {
            url: "http://example.com".into(),
            message: "503".into(),
        }
        .is_retryable());
        assert!(!PortableError::ExtractionFailed {
            message: "bad archive".into()
        }
        .is_retryable());
        assert!(!PortableError::MissingRuntime(PathBuf::from("/tmp/bin/node")).is_retryable());
    }
}
