//! Network layer: HTTP client, retries, downloads and release lookups.

pub mod client;
pub mod download;
pub mod releases;
pub mod retry;

pub use client::HttpClient;
pub use download::{verify_integrity, DownloadProgress, Downloader};
pub use releases::{GitHubRelease, ReleasesClient};
pub use retry::{retry_async, RetryConfig, RetryStats};
