//! Shared HTTP client.
//!
//! Wraps reqwest with the launcher's timeout, user-agent and redirect
//! policy. Redirect chains are followed transparently but capped, so a
//! misconfigured mirror cannot loop the client forever.

use crate::config::NetworkConfig;
use crate::error::{PortableError, Result};
use reqwest::{redirect, Client, Response, StatusCode};
use std::time::Duration;

/// HTTP client used for release lookups and archive downloads.
pub struct HttpClient {
    client: Client,
    default_timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::REQUEST_TIMEOUT)
    }

    /// Create a new HTTP client with a custom default timeout.
    ///
    /// The timeout applies per request; streaming bodies are bounded
    /// separately by the download loop.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .redirect(redirect::Policy::limited(NetworkConfig::MAX_REDIRECTS))
            .build()
            .map_err(|e| PortableError::Network {
                message: format!("Failed to create HTTP client: {e}"),
                source: Some(e),
            })?;

        Ok(Self {
            client,
            default_timeout: timeout,
        })
    }

    /// Get a reference to the underlying reqwest client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Make a GET request.
    ///
    /// Non-success statuses are returned, not mapped to errors; the
    /// caller decides whether a 404 is fatal.
    pub async fn get(&self, url: &str) -> Result<Response> {
        self.client
            .get(url)
            .timeout(self.default_timeout)
            .send()
            .await
            .map_err(|e| PortableError::Network {
                message: format!("GET {url} failed: {e}"),
                source: Some(e),
            })
    }

    /// Make a GET request with custom headers.
    pub async fn get_with_headers(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<Response> {
        let mut request = self.client.get(url).timeout(self.default_timeout);
        for (key, value) in headers {
            request = request.header(key.as_str(), value.as_str());
        }

        request.send().await.map_err(|e| PortableError::Network {
            message: format!("GET {url} failed: {e}"),
            source: Some(e),
        })
    }

    /// Start a GET request without a whole-request deadline.
    ///
    /// Used for archive downloads where the body can legitimately take
    /// longer than any fixed request timeout; the download loop applies
    /// its own per-chunk deadline instead.
    pub async fn get_streaming(&self, url: &str) -> Result<Response> {
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| PortableError::Network {
                message: format!("GET {url} failed: {e}"),
                source: Some(e),
            })
    }

    /// Check if an HTTP status code indicates a retryable error.
    pub fn is_retryable_status(status: StatusCode) -> bool {
        matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
    }

    /// Check if an HTTP status code indicates a permanent failure.
    pub fn is_permanent_failure(status: StatusCode) -> bool {
        matches!(status.as_u16(), 400 | 401 | 403 | 404)
    }
}
