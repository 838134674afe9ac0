//! HTTP client wrapper.
//!
//! Owns the reqwest client, its timeouts and user agent, and turns transport
//! failures and non-success statuses into [`FetchError`]s that the retry
//! policy can classify.

use crate::config::NetworkConfig;
use crate::{FetchError, Result};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;

/// HTTP client used for audio downloads.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    /// Create a client with the default download timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::DOWNLOAD_REQUEST_TIMEOUT, NetworkConfig::USER_AGENT)
    }

    /// Create a client whose requests, body included, are bounded by `timeout`.
    pub fn with_timeout(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(NetworkConfig::CONNECT_TIMEOUT))
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;

        Ok(Self { client, timeout })
    }

    /// Timeout applied to each request, body included.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET `url`, failing on any non-success status.
    pub async fn get(&self, url: &str) -> Result<Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        debug!("GET {} -> {} ({})", url, status, extract_domain(url));
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

/// Extract the host from a URL for log context.
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}
