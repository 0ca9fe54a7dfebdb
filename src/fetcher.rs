//! Page fetching with timeout, bounded retries and error classification
//!
//! ## Retry policy
//!
//! ```text
//! Timeout / connection failure / 5xx → retry (up to max_retries, backoff doubles)
//! 403 / 429                          → Blocked, no retry
//! other 4xx                          → HttpError, no retry
//! ```
//!
//! Expected network failures are returned as [`FetchError`] values; nothing
//! in here panics or bubbles a transport error up untyped.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

use crate::config::FetcherConfig;

/// Raw result of a successful fetch
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub body: String,
    pub content_type: Option<String>,
    pub status_code: u16,
    /// Body was cut at the configured maximum content length
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out after {after_secs}s")]
    Timeout { after_secs: u64 },

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("HTTP error {status}")]
    HttpError { status: u16 },

    /// The site refused automated access (403) or rate limited us (429)
    #[error("blocked by site (HTTP {status})")]
    Blocked { status: u16 },
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::ConnectionFailed(_) => true,
            FetchError::HttpError { status } => *status >= 500,
            FetchError::Blocked { .. } => false,
        }
    }

    /// Actionable text for an interactive caller
    pub fn user_hint(&self) -> String {
        match self {
            FetchError::Timeout { after_secs } => format!(
                "Timeout: the site did not answer within {after_secs}s; it may be slow or down, try again later"
            ),
            FetchError::ConnectionFailed(_) => {
                "Connection failed: the site could not be reached; check the URL and try again".to_string()
            }
            FetchError::HttpError { status: 404 } => {
                "Page not found (HTTP 404): please check the URL is correct".to_string()
            }
            FetchError::HttpError { status: 503 } => {
                "Service unavailable (HTTP 503): the site is temporarily down, try again later".to_string()
            }
            FetchError::HttpError { status } => format!("The site answered with HTTP {status}"),
            FetchError::Blocked { status: 429 } => {
                "Rate limited (HTTP 429): the site is refusing further requests for now; raise the check interval".to_string()
            }
            FetchError::Blocked { .. } => {
                "Blocked: this site rejects automated requests; try an alternate source".to_string()
            }
        }
    }
}

/// Capability to GET a page
///
/// The scheduler only talks to this trait so tests can substitute slow or
/// scripted fetchers.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// reqwest-backed fetcher
pub struct HttpFetcher {
    /// HTTP client (reused across requests for efficiency)
    client: reqwest::Client,
    config: FetcherConfig,
}

impl HttpFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self { client, config })
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.config.retry_backoff_ms.saturating_mul(factor))
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                after_secs: self.config.timeout_secs,
            }
        } else {
            FetchError::ConnectionFailed(err.to_string())
        }
    }

    async fn attempt(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status().as_u16();
        match status {
            403 | 429 => return Err(FetchError::Blocked { status }),
            _ if !response.status().is_success() => return Err(FetchError::HttpError { status }),
            _ => {}
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let limit = self.config.max_content_length;
        let mut body = Vec::new();
        let mut truncated = false;

        while let Some(chunk) = response.chunk().await.map_err(|e| self.classify(e))? {
            body.extend_from_slice(&chunk);
            if body.len() >= limit {
                truncated = body.len() > limit;
                body.truncate(limit);
                break;
            }
        }

        if truncated {
            debug!("response body truncated to {limit} bytes");
        }

        Ok(FetchedPage {
            body: String::from_utf8_lossy(&body).into_owned(),
            content_type,
            status_code: status,
            truncated,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let mut attempt = 0;

        loop {
            trace!("fetching (attempt {})", attempt + 1);

            match self.attempt(url).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let backoff = self.backoff(attempt);
                    debug!("transient fetch failure ({e}), retrying in {backoff:?}");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!("fetch failed: {e}");
                    return Err(e);
                }
            }
        }
    }
}
