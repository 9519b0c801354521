//! GitHub API client for fetching release information.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderValue};

use super::types::GitHubRelease;
use crate::error::{Result, UpdateError};
use crate::proxy::{ProxyResolver, build_http_client};

/// Timeout for release metadata requests.
pub const FEED_TIMEOUT: Duration = Duration::from_secs(30);

/// Accept header for the GitHub REST API.
const ACCEPT_VALUE: &str = "application/vnd.github.v3+json";

/// Client for a single release feed URL.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    feed_url: String,
}

impl GitHubClient {
    /// Creates a client for `feed_url`.
    ///
    /// Requests identify themselves as `<product_name>-update-checker`; GitHub
    /// rate-limits anonymous requests without a user agent much harder.
    pub fn new(
        feed_url: impl Into<String>,
        product_name: &str,
        proxy: Arc<dyn ProxyResolver>,
    ) -> Result<Self> {
        let user_agent = format!("{product_name}-update-checker");
        let client = build_http_client(FEED_TIMEOUT, &user_agent, proxy)?;

        Ok(Self {
            client,
            feed_url: feed_url.into(),
        })
    }

    /// Returns the feed URL this client queries.
    #[must_use]
    pub fn feed_url(&self) -> &str {
        &self.feed_url
    }

    /// Fetches the latest release.
    pub async fn get_latest_release(&self) -> Result<GitHubRelease> {
        tracing::debug!("Fetching latest release from {}", self.feed_url);

        let response = self
            .client
            .get(&self.feed_url)
            .header(ACCEPT, HeaderValue::from_static(ACCEPT_VALUE))
            .send()
            .await
            .map_err(|e| UpdateError::Fetch(e.to_string()))?;

        self.handle_response(response).await
    }

    /// Checks the status and parses the release body.
    async fn handle_response(&self, response: reqwest::Response) -> Result<GitHubRelease> {
        let status = response.status();

        if status == StatusCode::FORBIDDEN
            && response
                .headers()
                .get("x-ratelimit-remaining")
                .is_some_and(|remaining| remaining.to_str().unwrap_or("1") == "0")
        {
            let reset = response
                .headers()
                .get("x-ratelimit-reset")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string();
            return Err(UpdateError::Fetch(format!(
                "GitHub API rate limit exceeded (resets at {reset})"
            )));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpdateError::Fetch(format!(
                "GitHub API returned status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| UpdateError::Fetch(format!("failed to read response body: {e}")))?;

        serde_json::from_str(&body).map_err(|e| UpdateError::Decode(e.to_string()))
    }
}
