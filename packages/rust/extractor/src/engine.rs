//! The content extractor: URL in, [`ExtractedRecord`] out.
//!
//! Extraction is stateless and safe to retry. Only malformed URLs and truly
//! unreachable resources are errors; timeouts and unparsable bodies degrade to
//! a record carrying just the URL.

use std::net::IpAddr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use curator_shared::{
    ContentType, CuratorError, ExtractedMetadata, ExtractedRecord, ExtractorConfig, Result,
    canonical_url, parse_http_url,
};

use crate::fetch::{FetchError, FetchResponse, Fetcher, HttpFetcher, RetryPolicy};
use crate::html::{PageMetadata, parse_metadata};
use crate::video::VideoRegistry;

/// Path fragments marking a document as a report rather than a plain PDF/article.
static REPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(report|whitepaper|white-paper|annual-review|research-paper)")
        .expect("valid regex")
});

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Hard extraction failures. Everything else degrades to a partial record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("unreachable resource {url}: {reason}")]
    UnreachableResource { url: String, reason: String },
}

impl From<ExtractionError> for CuratorError {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::InvalidUrl(message) => CuratorError::InvalidInput { message },
            ExtractionError::UnreachableResource { url, reason } => {
                CuratorError::Unreachable { url, reason }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Fetches a URL and normalizes it into an [`ExtractedRecord`].
pub struct Extractor {
    fetcher: Arc<dyn Fetcher>,
    retry: RetryPolicy,
    /// Budget for all attempts on one URL.
    deadline: Duration,
    videos: VideoRegistry,
    max_excerpt_chars: usize,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_private_hosts: bool,
}

impl Extractor {
    /// Create an extractor over an arbitrary fetcher.
    pub fn new(fetcher: Arc<dyn Fetcher>, config: &ExtractorConfig) -> Self {
        Self {
            fetcher,
            retry: RetryPolicy::from(&config.retry),
            deadline: Duration::from_secs(config.deadline_secs.max(1)),
            videos: VideoRegistry::new(),
            max_excerpt_chars: config.max_excerpt_chars,
            allow_private_hosts: false,
        }
    }

    /// Create an extractor backed by the real HTTP fetcher.
    pub fn from_config(config: &ExtractorConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(config)?;
        Ok(Self::new(Arc::new(fetcher), config))
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Replace the fetch deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Allow fetching localhost/private IPs.
    pub fn allow_private_hosts(mut self) -> Self {
        self.allow_private_hosts = true;
        self
    }

    /// Extract metadata for one URL.
    #[instrument(skip(self), fields(url = %raw_url))]
    pub async fn extract(&self, raw_url: &str) -> std::result::Result<ExtractedRecord, ExtractionError> {
        let url = parse_http_url(raw_url).map_err(|e| ExtractionError::InvalidUrl(e.to_string()))?;
        let canonical =
            canonical_url(raw_url).map_err(|e| ExtractionError::InvalidUrl(e.to_string()))?;

        if !self.allow_private_hosts && is_private_target(&url) {
            warn!(%url, "blocked private or local address");
            return Err(ExtractionError::InvalidUrl(format!(
                "refusing to fetch private or local address: {raw_url}"
            )));
        }

        let mut record = ExtractedRecord::url_only(&canonical, raw_url.trim());
        record.metadata.source_domain = source_domain(&url);

        if let Some(found) = self.videos.detect(&url) {
            debug!(platform = %found.video.platform, id = %found.video.id, "video URL recognised");
            record.metadata.content_type = Some(ContentType::Video);
            record.metadata.thumbnail_url = found.thumbnail_url;
            record.metadata.video = Some(found.video);
            return Ok(record);
        }

        let attempts = self.retry.run(self.fetcher.as_ref(), url.as_str());
        let outcome = tokio::time::timeout(self.deadline, attempts)
            .await
            .unwrap_or(Err(FetchError::Timeout));

        let response = match outcome {
            Ok(response) => response,
            Err(FetchError::Timeout) => {
                warn!(%url, "fetch timed out, keeping partial record");
                return Ok(record);
            }
            Err(FetchError::Body(reason)) => {
                warn!(%url, %reason, "unreadable body, keeping partial record");
                return Ok(record);
            }
            Err(e) => {
                return Err(ExtractionError::UnreachableResource {
                    url: raw_url.trim().to_string(),
                    reason: e.to_string(),
                });
            }
        };

        self.fill_from_response(&mut record, &url, &response);

        info!(
            content_type = record.metadata.content_type.map(|c| c.as_str()).unwrap_or("none"),
            has_title = record.title.is_some(),
            partial = record.is_partial(),
            "extracted"
        );

        Ok(record)
    }

    fn fill_from_response(&self, record: &mut ExtractedRecord, url: &Url, response: &FetchResponse) {
        let looks_like_report = REPORT_RE.is_match(url.path());

        match response.content_type.as_deref() {
            Some("application/pdf") => {
                record.metadata.content_type = Some(if looks_like_report {
                    ContentType::Report
                } else {
                    ContentType::Pdf
                });
            }
            Some(ct) if is_html(ct) => self.fill_from_html(record, url, &response.body),
            None if response.body.trim_start().starts_with('<') => {
                self.fill_from_html(record, url, &response.body)
            }
            None if url.path().to_ascii_lowercase().ends_with(".pdf") => {
                record.metadata.content_type = Some(ContentType::Pdf);
            }
            other => {
                debug!(content_type = ?other, "unsupported content type, keeping partial record");
            }
        }
    }

    fn fill_from_html(&self, record: &mut ExtractedRecord, url: &Url, body: &str) {
        let PageMetadata {
            title,
            description,
            author,
            published_at,
            site_name,
            og_type,
            image,
            body_text,
        } = parse_metadata(body, url);

        let content_type = if og_type.as_deref().is_some_and(|t| t.starts_with("video")) {
            ContentType::Video
        } else if REPORT_RE.is_match(url.path()) {
            ContentType::Report
        } else {
            ContentType::Article
        };

        record.title = title;
        record.description = description;
        record.body_text = body_text.map(|t| truncate_excerpt(&t, self.max_excerpt_chars));
        record.metadata = ExtractedMetadata {
            author,
            published_at,
            source_domain: record.metadata.source_domain.take(),
            content_type: Some(content_type),
            site_name,
            video: None,
            thumbnail_url: image,
        };
    }
}

fn is_html(content_type: &str) -> bool {
    content_type == "text/html" || content_type == "application/xhtml+xml"
}

/// Host without a leading `www.`.
pub(crate) fn source_domain(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Cut `text` to at most `max` characters on a word boundary.
pub(crate) fn truncate_excerpt(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    let trimmed = match cut.rfind(char::is_whitespace) {
        Some(idx) if idx > max / 2 => &cut[..idx],
        _ => cut.as_str(),
    };
    format!("{}…", trimmed.trim_end())
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a loopback, private, or local-only host.
fn is_private_target(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}
