//! GitHub API client implementation

use crate::core::{ShelfError, ShelfResult};
use crate::github::types::Release;
use reqwest::{header, Client as HttpClient, StatusCode};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::debug;

/// GitHub API client
pub struct GitHubClient {
    http_client: HttpClient,
    api_url: String,
    token: Option<String>,
    rate_limiter: Arc<RateLimiter>,
}

/// Rate limiter for GitHub API
struct RateLimiter {
    remaining: Mutex<u64>,
    reset_time: Mutex<SystemTime>,
}

impl GitHubClient {
    /// Create a new GitHub client
    pub fn new(api_url: &str, token: Option<String>, timeout: Duration) -> ShelfResult<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static("shelf-bundle-manager"),
        );
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );

        if let Some(ref token) = token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("token {}", token))
                    .map_err(|e| ShelfError::Config(format!("Invalid GitHub token: {}", e)))?,
            );
        }

        let http_client = HttpClient::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ShelfError::Network(format!("Failed to create HTTP client: {}", e)))?;

        let has_token = token.is_some();
        Ok(Self {
            http_client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            rate_limiter: Arc::new(RateLimiter {
                remaining: Mutex::new(if has_token { 5000 } else { 60 }),
                reset_time: Mutex::new(SystemTime::now() + Duration::from_secs(3600)),
            }),
        })
    }

    /// Get the latest published release; `None` when the repository has none
    pub async fn get_latest_release(&self, owner: &str, repo: &str) -> ShelfResult<Option<Release>> {
        let url = format!("{}/repos/{}/{}/releases/latest", self.api_url, owner, repo);
        self.api_get(&url).await
    }

    /// Get one page of releases, newest first
    pub async fn get_releases_page(
        &self,
        owner: &str,
        repo: &str,
        page: u32,
        per_page: u32,
    ) -> ShelfResult<Vec<Release>> {
        let url = format!(
            "{}/repos/{}/{}/releases?per_page={}&page={}",
            self.api_url, owner, repo, per_page, page
        );
        Ok(self.api_get(&url).await?.unwrap_or_default())
    }

    /// Requests left in the current rate-limit window
    pub async fn rate_limit_remaining(&self) -> u64 {
        *self.rate_limiter.remaining.lock().await
    }

    /// Make an API request and handle rate limiting. A 404 is `None`.
    async fn api_request(&self, url: &str) -> ShelfResult<Option<reqwest::Response>> {
        // Check rate limit
        self.check_rate_limit().await?;

        debug!("GET {}", url);
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| ShelfError::Network(format!("GitHub API request failed: {}", e)))?;

        // Update rate limit from headers
        self.update_rate_limit(&response).await;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(ShelfError::Network(format!(
                "GitHub API error: HTTP {}",
                response.status()
            )));
        }

        Ok(Some(response))
    }

    /// Make an API GET request and parse JSON response
    async fn api_get<T: serde::de::DeserializeOwned>(&self, url: &str) -> ShelfResult<Option<T>> {
        let response = match self.api_request(url).await? {
            Some(response) => response,
            None => return Ok(None),
        };

        response.json().await.map(Some).map_err(|e| {
            ShelfError::Network(format!("Failed to parse GitHub API response: {}", e))
        })
    }

    /// Check if we're within rate limits
    async fn check_rate_limit(&self) -> ShelfResult<()> {
        let remaining = *self.rate_limiter.remaining.lock().await;
        let reset_time = *self.rate_limiter.reset_time.lock().await;

        if remaining == 0 {
            let now = SystemTime::now();
            if now < reset_time {
                let wait_duration = reset_time.duration_since(now).unwrap_or(Duration::ZERO);
                return Err(ShelfError::Network(format!(
                    "GitHub API rate limit exceeded. Reset in {} seconds. {}",
                    wait_duration.as_secs(),
                    if self.token.is_none() {
                        "Consider setting GITHUB_TOKEN to increase rate limit to 5000/hour."
                    } else {
                        ""
                    }
                )));
            }
        }

        Ok(())
    }

    /// Update rate limit from response headers
    async fn update_rate_limit(&self, response: &reqwest::Response) {
        if let Some(remaining) = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
        {
            *self.rate_limiter.remaining.lock().await = remaining;
        }

        if let Some(reset) = response
            .headers()
            .get("x-ratelimit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
        {
            *self.rate_limiter.reset_time.lock().await =
                SystemTime::UNIX_EPOCH + Duration::from_secs(reset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GitHubClient {
        GitHubClient::new(&server.uri(), None, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_latest_release_not_found_is_none() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/tool/releases/latest"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let release = client(&mock_server)
            .get_latest_release("acme", "tool")
            .await
            .unwrap();
        assert!(release.is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_network_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/tool/releases/latest"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let result = client(&mock_server).get_latest_release("acme", "tool").await;
        assert!(matches!(result, Err(ShelfError::Network(_))));
    }

    #[tokio::test]
    async fn test_rate_limit_headers_tracked() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/tool/releases"))
            .and(query_param("page", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-ratelimit-remaining", "0")
                    .insert_header("x-ratelimit-reset", "99999999999")
                    .set_body_json(serde_json::json!([])),
            )
            .mount(&mock_server)
            .await;

        let client = client(&mock_server);
        let releases = client.get_releases_page("acme", "tool", 1, 100).await.unwrap();
        assert!(releases.is_empty());
        assert_eq!(client.rate_limit_remaining().await, 0);

        // The next call is refused locally until the window resets
        let result = client.get_releases_page("acme", "tool", 2, 100).await;
        match result {
            Err(ShelfError::Network(msg)) => assert!(msg.contains("rate limit")),
            other => panic!("Expected rate limit error, got {:?}", other.map(|r| r.len())),
        }
    }
}
