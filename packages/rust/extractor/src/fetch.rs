//! HTTP fetching behind the [`Fetcher`] seam, plus the bounded retry policy.
//!
//! The extractor never talks to `reqwest` directly: tests inject fakes that
//! fail a fixed number of times to exercise [`RetryPolicy`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use curator_shared::{CuratorError, ExtractorConfig, Result, RetryConfig};

/// User-Agent string for outbound fetches.
const USER_AGENT: &str = concat!("curator/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Fetch types
// ---------------------------------------------------------------------------

/// A successful (2xx) response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    /// Lowercased media type without parameters (e.g. `text/html`).
    pub content_type: Option<String>,
    /// URL after redirects.
    pub final_url: String,
    /// Decoded body. Empty for binary documents we do not parse.
    pub body: String,
}

/// Why a single fetch attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("unreadable body: {0}")]
    Body(String),
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connect(_) => true,
            Self::Status(code) => *code == 429 || *code >= 500,
            Self::Body(_) => false,
        }
    }
}

/// Capability to fetch a URL. Implementations must be safe to retry.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<FetchResponse, FetchError>;
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Bounded exponential backoff for transient fetch failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1) as i32;
        let millis = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exp);
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Run `fetcher` until success, a permanent failure, or the attempt budget runs out.
    pub async fn run(
        &self,
        fetcher: &dyn Fetcher,
        url: &str,
    ) -> std::result::Result<FetchResponse, FetchError> {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match fetcher.fetch(url).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.backoff_after(attempt);
                    warn!(%url, attempt, error = %e, delay_ms = delay.as_millis(), "transient fetch failure, retrying");
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => {
                    debug!(%url, attempt, error = %e, "fetch failed");
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.multiplier,
        }
    }
}

// ---------------------------------------------------------------------------
// HttpFetcher
// ---------------------------------------------------------------------------

/// `reqwest`-backed fetcher with a per-request timeout.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &ExtractorConfig) -> Result<Self> {
        let user_agent = config.user_agent.as_deref().unwrap_or(USER_AGENT);
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CuratorError::Extraction(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<FetchResponse, FetchError> {
        let response = self.client.get(url).send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(media_type);
        let final_url = response.url().to_string();

        let body = if is_binary_document(content_type.as_deref()) {
            String::new()
        } else {
            let bytes = response.bytes().await.map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Body(e.to_string())
                }
            })?;
            String::from_utf8_lossy(&bytes).into_owned()
        };

        Ok(FetchResponse {
            status: status.as_u16(),
            content_type,
            final_url,
            body,
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if let Some(status) = e.status() {
        FetchError::Status(status.as_u16())
    } else {
        FetchError::Connect(e.to_string())
    }
}

/// Strip parameters from a Content-Type header value.
pub(crate) fn media_type(header: &str) -> String {
    header
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_binary_document(content_type: Option<&str>) -> bool {
    matches!(
        content_type,
        Some("application/pdf") | Some("application/octet-stream")
    ) || content_type.is_some_and(|ct| {
        ct.starts_with("image/") || ct.starts_with("video/") || ct.starts_with("audio/")
    })
}
