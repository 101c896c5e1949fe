//! HTTP client for the upstream inventory platform
//!
//! Provides authenticated, rate-limited page fetches against the upstream
//! REST surface with typed errors and a bounded retry budget. The client is
//! the only component that talks to the network; everything downstream
//! consumes the JSON payloads it returns.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::infrastructure::config::{UpstreamConfig, upstream::params};
use crate::infrastructure::retry::RetryPolicy;

/// Longest body excerpt carried inside an error
const BODY_PREVIEW_LEN: usize = 200;

/// Typed failures from upstream page fetches
#[derive(Error, Debug, Clone)]
pub enum UpstreamError {
    #[error("Upstream rejected credentials (HTTP {status})")]
    AuthRejected { status: u16 },

    #[error("Upstream returned HTTP {status}: {body_preview}")]
    HttpStatus { status: u16, body_preview: String },

    #[error("Transport failure: {message}")]
    Transport { message: String },

    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: String },

    #[error("Upstream returned non-JSON content ({content_type}): {body_preview}")]
    NotJson {
        content_type: String,
        body_preview: String,
    },

    #[error("Upstream returned malformed JSON: {message}")]
    MalformedJson { message: String },
}

impl UpstreamError {
    /// Credential rejection is terminal for the whole run and never retried
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthRejected { .. })
    }

    /// Whether the retry budget applies: transport faults, 429 and 5xx
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// One page of records requested from a list endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: u32,
    pub offset: u32,
    pub updated_since: Option<DateTime<Utc>>,
}

/// Raw JSON payload of a fetched page, before normalization
#[derive(Debug, Clone)]
pub struct RawPage {
    pub body: serde_json::Value,
    pub offset: u32,
    pub limit: u32,
}

/// Seam between the orchestrator and the network
///
/// Tests drive the sync engine with scripted implementations of this trait.
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    async fn fetch_page(
        &self,
        resource: &str,
        request: &PageRequest,
    ) -> Result<RawPage, UpstreamError>;
}

/// Rate-limited HTTP client with Basic Auth and bounded retries
pub struct UpstreamClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    retry_policy: RetryPolicy,
    base_url: Url,
    config: UpstreamConfig,
}

impl UpstreamClient {
    /// Create a new client from an immutable config snapshot
    pub fn new(config: UpstreamConfig) -> anyhow::Result<Self> {
        use anyhow::Context;

        let mut base_url = config.parsed_base_url()?;
        // Resource names must append to the base path, not replace its last segment
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second)
                .context("Rate limit must be greater than 0")?,
        );
        let rate_limiter = RateLimiter::direct(quota);

        let retry_policy = RetryPolicy {
            max_attempts: config.max_retries.max(1),
            base_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
            ..RetryPolicy::default()
        };

        Ok(Self {
            client,
            rate_limiter,
            retry_policy,
            base_url,
            config,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    fn request_url(&self, resource: &str, request: &PageRequest) -> Result<Url, UpstreamError> {
        let mut url = self
            .base_url
            .join(resource)
            .map_err(|e| UpstreamError::Transport {
                message: format!("Invalid resource path '{resource}': {e}"),
            })?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair(params::LIMIT, &request.limit.to_string());
            pairs.append_pair(params::OFFSET, &request.offset.to_string());
            if let Some(since) = request.updated_since {
                pairs.append_pair(
                    params::UPDATED_AFTER,
                    &since.to_rfc3339_opts(SecondsFormat::Secs, true),
                );
            }
        }

        Ok(url)
    }

    async fn fetch_page_once(
        &self,
        resource: &str,
        request: &PageRequest,
    ) -> Result<RawPage, UpstreamError> {
        // Wait for rate limiter
        self.rate_limiter.until_ready().await;

        let url = self.request_url(resource, request)?;
        debug!(
            "Fetching upstream page: {} (offset={}, limit={})",
            resource, request.offset, request.limit
        );

        let response = self
            .client
            .get(url)
            .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
            .send()
            .await
            .map_err(|e| UpstreamError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(UpstreamError::AuthRejected {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let text = response
            .text()
            .await
            .map_err(|e| UpstreamError::Transport {
                message: e.to_string(),
            })?;

        if !status.is_success() {
            return Err(UpstreamError::HttpStatus {
                status: status.as_u16(),
                body_preview: body_preview(&text),
            });
        }

        // HTML error pages served with 200 are caught here, before parsing
        if !content_type.is_empty() && !content_type.contains("json") {
            return Err(UpstreamError::NotJson {
                content_type,
                body_preview: body_preview(&text),
            });
        }

        let body =
            serde_json::from_str::<serde_json::Value>(&text).map_err(|e| {
                UpstreamError::MalformedJson {
                    message: e.to_string(),
                }
            })?;

        Ok(RawPage {
            body,
            offset: request.offset,
            limit: request.limit,
        })
    }

    async fn fetch_page_with_retries(
        &self,
        resource: &str,
        request: &PageRequest,
    ) -> Result<RawPage, UpstreamError> {
        let mut attempt = 1u32;

        loop {
            match self.fetch_page_once(resource, request).await {
                Ok(page) => return Ok(page),
                Err(err) if err.is_auth() => return Err(err),
                Err(err) if err.is_retryable() => {
                    if !self.retry_policy.should_retry(attempt) {
                        return Err(UpstreamError::RetryExhausted {
                            attempts: attempt,
                            last: err.to_string(),
                        });
                    }

                    let delay = self.retry_policy.delay_for(attempt);
                    warn!(
                        "Upstream fetch attempt {} for '{}' failed ({}), retrying in {:?}",
                        attempt, resource, err, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl UpstreamFetcher for UpstreamClient {
    async fn fetch_page(
        &self,
        resource: &str,
        request: &PageRequest,
    ) -> Result<RawPage, UpstreamError> {
        self.fetch_page_with_retries(resource, request).await
    }
}

fn body_preview(text: &str) -> String {
    if text.len() <= BODY_PREVIEW_LEN {
        return text.to_string();
    }

    // Cut on a char boundary
    let mut end = BODY_PREVIEW_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> UpstreamConfig {
        UpstreamConfig {
            base_url: "http://localhost:8080/rest".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            ..UpstreamConfig::default()
        }
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client = UpstreamClient::new(test_config());
        assert!(client.is_ok());
    }

    #[test]
    fn request_url_appends_resource_and_pagination() {
        let client = UpstreamClient::new(test_config()).unwrap();
        let url = client
            .request_url(
                "product",
                &PageRequest {
                    limit: 100,
                    offset: 200,
                    updated_since: None,
                },
            )
            .unwrap();

        assert_eq!(url.path(), "/rest/product");
        let query = url.query().unwrap();
        assert!(query.contains("limit=100"));
        assert!(query.contains("offset=200"));
        assert!(!query.contains("updatedAfter"));
    }

    #[test]
    fn request_url_carries_incremental_filter() {
        let client = UpstreamClient::new(test_config()).unwrap();
        let since = DateTime::parse_from_rfc3339("2024-03-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let url = client
            .request_url(
                "order",
                &PageRequest {
                    limit: 50,
                    offset: 0,
                    updated_since: Some(since),
                },
            )
            .unwrap();

        assert!(url.query().unwrap().contains("updatedAfter=2024-03-01T00"));
    }

    #[test]
    fn auth_rejection_is_never_retryable() {
        let err = UpstreamError::AuthRejected { status: 401 };
        assert!(err.is_auth());
        assert!(!err.is_retryable());
    }

    #[test]
    fn server_errors_and_transport_are_retryable() {
        assert!(
            UpstreamError::HttpStatus {
                status: 503,
                body_preview: String::new()
            }
            .is_retryable()
        );
        assert!(
            UpstreamError::HttpStatus {
                status: 429,
                body_preview: String::new()
            }
            .is_retryable()
        );
        assert!(
            UpstreamError::Transport {
                message: "connection reset".to_string()
            }
            .is_retryable()
        );
        assert!(
            !UpstreamError::HttpStatus {
                status: 404,
                body_preview: String::new()
            }
            .is_retryable()
        );
        assert!(
            !UpstreamError::NotJson {
                content_type: "text/html".to_string(),
                body_preview: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn body_preview_is_bounded() {
        let long = "x".repeat(500);
        let preview = body_preview(&long);
        assert!(preview.chars().count() <= BODY_PREVIEW_LEN + 1);
        assert_eq!(body_preview("short"), "short");
    }
}
