//! GitHub releases lookup for upgrade targeting.
//!
//! Queries the releases API for the configured repository, filters out
//! drafts and prereleases, and normalizes tag names so callers always
//! compare bare version strings.

use crate::config::NetworkConfig;
use crate::error::{PortableError, Result};
use crate::network::client::HttpClient;
use crate::network::retry::{retry_async, RetryConfig};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

/// A release entry as returned by the GitHub API.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub published_at: Option<String>,
    /// Release notes, when the publisher wrote any.
    #[serde(default)]
    pub body: Option<String>,
}

impl GitHubRelease {
    /// Tag with any leading `v` removed, e.g. `v1.64.0` reports `1.64.0`.
    pub fn version(&self) -> &str {
        normalize_tag(&self.tag_name)
    }

    /// Stable means published: neither a draft nor a prerelease.
    pub fn is_stable(&self) -> bool {
        !self.draft && !self.prerelease
    }
}

/// Strip a single leading `v` from a release tag.
pub fn normalize_tag(tag: &str) -> &str {
    tag.strip_prefix('v').unwrap_or(tag)
}

/// Client for the releases endpoint of one repository.
pub struct ReleasesClient {
    http: Arc<HttpClient>,
    api_base: String,
    repo: String,
}

impl ReleasesClient {
    pub fn new(repo: &str) -> Result<Self> {
        Ok(Self {
            http: Arc::new(HttpClient::new()?),
            api_base: NetworkConfig::GITHUB_API_BASE.to_string(),
            repo: repo.to_string(),
        })
    }

    /// Point the client at a different API host. Used by tests.
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    /// Fetch all releases for the repository, retrying transient failures.
    pub async fn fetch_releases(&self) -> Result<Vec<GitHubRelease>> {
        let url = format!("{}/repos/{}/releases", self.api_base, self.repo);

        let retry_config = RetryConfig::new();
        let http = self.http.clone();
        let url_clone = url.clone();

        let (result, stats) = retry_async(
            &retry_config,
            || {
                let http = http.clone();
                let url = url_clone.clone();
                async move {
                    let mut headers = vec![(
                        "Accept".to_string(),
                        "application/vnd.github.v3+json".to_string(),
                    )];
                    // An ambient token raises the unauthenticated rate limit
                    if let Ok(token) =
                        std::env::var("GITHUB_TOKEN").or_else(|_| std::env::var("GH_TOKEN"))
                    {
                        headers.push(("Authorization".to_string(), format!("Bearer {token}")));
                    }
                    http.get_with_headers(&url, &headers).await
                }
            },
            |e: &PortableError| e.is_retryable(),
        )
        .await;

        if stats.attempts > 1 {
            debug!("Releases request succeeded after {} attempts", stats.attempts);
        }

        let response = result?;
        let status = response.status();

        if status == StatusCode::FORBIDDEN {
            return Err(PortableError::GitHubApi {
                message: "GitHub API rate limit exceeded".to_string(),
                status_code: Some(status.as_u16()),
            });
        }

        if !status.is_success() {
            return Err(PortableError::GitHubApi {
                message: format!("GitHub API returned {status}"),
                status_code: Some(status.as_u16()),
            });
        }

        let releases: Vec<GitHubRelease> =
            response.json().await.map_err(|e| PortableError::Json {
                message: format!("Failed to parse GitHub releases: {e}"),
                source: None,
            })?;

        info!("Fetched {} releases for {}", releases.len(), self.repo);
        Ok(releases)
    }

    /// Latest stable release, or an error if the repository has none.
    pub async fn latest_stable(&self) -> Result<GitHubRelease> {
        let releases = self.fetch_releases().await?;
        releases
            .into_iter()
            .find(|r| r.is_stable())
            .ok_or_else(|| PortableError::GitHubApi {
                message: format!("No stable releases found for {}", self.repo),
                status_code: None,
            })
    }

    /// Find a stable release whose normalized tag matches `version`.
    ///
    /// `version` itself may carry a leading `v`; both sides normalize.
    pub async fn find_version(&self, version: &str) -> Result<Option<GitHubRelease>> {
        let wanted = normalize_tag(version);
        let releases = self.fetch_releases().await?;
        Ok(releases
            .into_iter()
            .find(|r| r.is_stable() && r.version() == wanted))
    }
}
