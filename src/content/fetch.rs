use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Typed lookup errors enabling retry classification.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error {status} fetching {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Timed out fetching {url}")]
    Timeout { url: String },

    #[error("Transport error fetching {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("Malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },
}

impl FetchError {
    /// Whether another attempt against the same URL could succeed.
    ///
    /// Gateways answer slowly or with garbage while a document is still being
    /// propagated, so timeouts and unparseable bodies count as transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::HttpStatus { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            FetchError::Timeout { .. } => true,
            FetchError::Transport { .. } => true,
            FetchError::Malformed { .. } => true,
        }
    }
}

/// Minimal HTTP client used by the content resolver.
#[async_trait::async_trait]
pub trait Fetch: Send + Sync {
    /// GET `url` and decode the body as JSON.
    async fn get_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<Value, FetchError>;
}

#[async_trait::async_trait]
impl Fetch for reqwest::Client {
    async fn get_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<Value, FetchError> {
        let mut builder = self.get(url).timeout(timeout);
        for &(k, v) in headers {
            builder = builder.header(k, v);
        }
        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout { url: url.into() }
            } else {
                FetchError::Transport {
                    url: url.into(),
                    reason: e.to_string(),
                }
            }
        };
        let resp = builder.send().await.map_err(classify)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.into(),
            });
        }
        let body = resp.bytes().await.map_err(classify)?;
        serde_json::from_slice(&body).map_err(|e| FetchError::Malformed {
            url: url.into(),
            reason: e.to_string(),
        })
    }
}
