use std::time::Duration;

use serde_json::Value;

use super::cid::{Cid, CidScheme};
use super::fetch::{Fetch, FetchError};
use crate::retry::{self, RetryAction, RetryConfig};

/// Header carrying the dedicated gateway access token.
const GATEWAY_TOKEN_HEADER: &str = "x-pinata-gateway-token";

/// One way of looking up an app-data document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Authoritative app-data service keyed directly by hash. Single attempt.
    Api { base_url: String },
    /// IPFS gateway lookup under one CID scheme, retried with backoff.
    Gateway { base_url: String, scheme: CidScheme },
}

impl Strategy {
    /// Services first, then the gateway for every CID scheme newest first.
    pub fn default_order(api_base_urls: &[String], gateway_url: &str) -> Vec<Strategy> {
        let gateway = gateway_url.trim_end_matches('/');
        api_base_urls
            .iter()
            .map(|base| Strategy::Api {
                base_url: base.trim_end_matches('/').to_string(),
            })
            .chain(CidScheme::NEWEST_FIRST.into_iter().map(|scheme| Strategy::Gateway {
                base_url: gateway.to_string(),
                scheme,
            }))
            .collect()
    }

    fn name(&self) -> String {
        match self {
            Strategy::Api { base_url } => format!("api {base_url}"),
            Strategy::Gateway { scheme, .. } => format!("gateway {}", scheme.as_str()),
        }
    }
}

/// Resolves an app hash to its document, or reports that it is unavailable.
#[async_trait::async_trait]
pub trait Resolve: Send + Sync {
    /// Look up `app_hash`, giving each retrying strategy `max_retries` attempts.
    async fn resolve(&self, app_hash: &str, max_retries: u32) -> Option<Value>;
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub strategies: Vec<Strategy>,
    pub gateway_token: Option<String>,
    pub request_timeout: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

/// Content resolver walking an ordered list of strategies.
pub struct ContentResolver<F: Fetch> {
    client: F,
    config: ResolverConfig,
}

impl<F: Fetch> ContentResolver<F> {
    pub fn new(client: F, config: ResolverConfig) -> Self {
        Self { client, config }
    }

    async fn try_strategy(
        &self,
        strategy: &Strategy,
        app_hash: &str,
        max_retries: u32,
    ) -> Option<Value> {
        match strategy {
            Strategy::Api { base_url } => {
                let url = format!("{base_url}/api/v1/app_data/{app_hash}");
                match self
                    .client
                    .get_json(&url, &[], self.config.request_timeout)
                    .await
                {
                    Ok(body) => full_app_data(&body),
                    Err(e) => {
                        tracing::debug!(app_hash, error = %e, "App data service lookup failed");
                        None
                    }
                }
            }
            Strategy::Gateway { base_url, scheme } => {
                let cid = match Cid::new(app_hash, *scheme) {
                    Ok(cid) => cid,
                    Err(e) => {
                        tracing::warn!(app_hash, error = %e, "Cannot derive CID");
                        return None;
                    }
                };
                let url = format!("{base_url}/ipfs/{cid}");
                let headers: Vec<(&str, &str)> = self
                    .config
                    .gateway_token
                    .as_deref()
                    .map(|token| (GATEWAY_TOKEN_HEADER, token))
                    .into_iter()
                    .collect();
                let backoff = RetryConfig {
                    max_attempts: max_retries.max(1),
                    base_delay: self.config.base_delay,
                    max_delay: self.config.max_delay,
                };
                let result = retry::retry_with_backoff(
                    &backoff,
                    |e: &FetchError| {
                        if e.is_retryable() {
                            RetryAction::Retry
                        } else {
                            RetryAction::Abort
                        }
                    },
                    || {
                        self.client
                            .get_json(&url, &headers, self.config.request_timeout)
                    },
                )
                .await;
                match result {
                    Ok(doc) => Some(doc),
                    Err(e) => {
                        tracing::debug!(app_hash, %cid, error = %e, "Gateway lookup exhausted");
                        None
                    }
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl<F: Fetch> Resolve for ContentResolver<F> {
    async fn resolve(&self, app_hash: &str, max_retries: u32) -> Option<Value> {
        for strategy in &self.config.strategies {
            if let Some(doc) = self.try_strategy(strategy, app_hash, max_retries).await {
                tracing::debug!(app_hash, strategy = %strategy.name(), "Resolved app data");
                return Some(doc);
            }
        }
        None
    }
}

/// Extract the document from an app-data service response.
///
/// The service answers `{"fullAppData": "<json text>"}`; anything else counts
/// as not found.
fn full_app_data(body: &Value) -> Option<Value> {
    let text = body.get("fullAppData")?.as_str()?;
    serde_json::from_str(text).ok()
}
