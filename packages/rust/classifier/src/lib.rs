//! Classifier: assigns a category and confidence to extracted records.
//!
//! Rules in [`rules`] decide first. When they land below the publish
//! threshold and a remote [`backend`] is configured, its verdict is consulted;
//! any backend failure keeps the local result. Classification never fails.

pub mod backend;
pub mod rules;

pub use backend::{
    BackendRequest, BackendVerdict, ClassificationBackend, HttpClassificationBackend,
    RemoteVerdict,
};
pub use rules::{RuleSet, Verdict};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};
use url::Url;

use curator_shared::{
    Category, ClassifiedRecord, ClassifierConfig, ConfidenceBand, ExtractedRecord, Result,
    slug_from_url, slugify,
};

/// Length of the body excerpt used when a record has no description.
const DESCRIPTION_FALLBACK_CHARS: usize = 200;
/// Text sent to the remote backend is capped to this many chars.
const BACKEND_TEXT_CHARS: usize = 2_000;

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Confidence cut-offs. `publish` and `review` are both inclusive lower bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub publish: f64,
    pub review: f64,
}

impl Thresholds {
    pub fn band(&self, confidence: f64) -> ConfidenceBand {
        if confidence >= self.publish {
            ConfidenceBand::AutoPublish
        } else if confidence >= self.review {
            ConfidenceBand::NeedsReview
        } else {
            ConfidenceBand::Unclassified
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from(&ClassifierConfig::default())
    }
}

impl From<&ClassifierConfig> for Thresholds {
    fn from(config: &ClassifierConfig) -> Self {
        Self {
            publish: config.publish_threshold,
            review: config.review_threshold,
        }
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

pub struct Classifier {
    rules: RuleSet,
    thresholds: Thresholds,
    backend: Option<Arc<dyn ClassificationBackend>>,
    backend_timeout: Duration,
}

impl Classifier {
    /// A rules-only classifier.
    pub fn new(config: &ClassifierConfig) -> Self {
        let timeout = config.backend.as_ref().map_or(15, |b| b.timeout_secs);
        Self {
            rules: RuleSet::new(config),
            thresholds: Thresholds::from(config),
            backend: None,
            backend_timeout: Duration::from_secs(timeout),
        }
    }

    /// Build from config, wiring the HTTP backend when one is configured.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let classifier = Self::new(config);
        match &config.backend {
            Some(backend) => {
                let http = HttpClassificationBackend::new(backend)?;
                Ok(classifier.with_backend(Arc::new(http)))
            }
            None => Ok(classifier),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn ClassificationBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Classify with local rules only.
    pub fn classify_local(&self, record: ExtractedRecord) -> ClassifiedRecord {
        let verdict = self.rules.evaluate(&record);
        self.finish(record, verdict)
    }

    /// Classify, consulting the remote backend for uncertain records.
    #[instrument(skip_all, fields(url = %record.url))]
    pub async fn classify(&self, record: ExtractedRecord) -> ClassifiedRecord {
        let local = self.rules.evaluate(&record);

        let verdict = match &self.backend {
            Some(backend) if local.confidence < self.thresholds.publish => {
                self.consult(backend.as_ref(), &record, local).await
            }
            _ => local,
        };

        let classified = self.finish(record, verdict);
        debug!(
            category = %classified.category,
            confidence = classified.confidence,
            band = ?classified.band,
            "classified"
        );
        classified
    }

    async fn consult(
        &self,
        backend: &dyn ClassificationBackend,
        record: &ExtractedRecord,
        local: Verdict,
    ) -> Verdict {
        let request = BackendRequest {
            url: record.url.clone(),
            title: record.title.clone(),
            description: record.description.clone(),
            text: record
                .body_text
                .as_deref()
                .map(|t| t.chars().take(BACKEND_TEXT_CHARS).collect()),
        };

        match tokio::time::timeout(self.backend_timeout, backend.classify(&request)).await {
            Ok(Ok(remote)) => {
                let mut tags = local.tags;
                for tag in remote.tags {
                    if !tags.contains(&tag) {
                        tags.push(tag);
                    }
                }
                Verdict {
                    category: remote.category,
                    confidence: remote.confidence,
                    subcategory: local.subcategory,
                    tags,
                }
            }
            Ok(Err(e)) => {
                warn!(url = %record.url, error = %e, "classification backend failed, keeping local verdict");
                local
            }
            Err(_) => {
                warn!(url = %record.url, "classification backend timed out, keeping local verdict");
                local
            }
        }
    }

    /// Apply thresholds and fill display fields.
    fn finish(&self, record: ExtractedRecord, verdict: Verdict) -> ClassifiedRecord {
        let confidence = if verdict.confidence.is_finite() {
            verdict.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let mut band = self.thresholds.band(confidence);
        if verdict.category == Category::Unknown {
            band = ConfidenceBand::Unclassified;
        }
        let category = match band {
            ConfidenceBand::Unclassified => Category::Unknown,
            _ => verdict.category,
        };

        ClassifiedRecord {
            title: display_title(&record),
            description: display_description(&record),
            url: record.url.clone(),
            record,
            category,
            subcategory: verdict.subcategory,
            tags: verdict.tags,
            confidence,
            band,
        }
    }
}

// ---------------------------------------------------------------------------
// Display fallbacks
// ---------------------------------------------------------------------------

fn display_title(record: &ExtractedRecord) -> String {
    if let Some(title) = record.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        return title.to_string();
    }
    if let Some(video) = &record.metadata.video {
        return format!("{} video {}", platform_label(&video.platform), video.id);
    }
    let Ok(url) = Url::parse(&record.url) else {
        return record.url.clone();
    };
    let host = url.host_str().unwrap_or_default().trim_start_matches("www.").to_string();
    let slug = slug_from_url(&record.url);
    if !slug.is_empty() && slug != slugify(&host) {
        humanize(&slug)
    } else if !host.is_empty() {
        host
    } else {
        record.url.clone()
    }
}

fn display_description(record: &ExtractedRecord) -> String {
    if let Some(desc) = record
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
    {
        return desc.to_string();
    }
    let Some(body) = record.body_text.as_deref() else {
        return String::new();
    };
    let flat = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= DESCRIPTION_FALLBACK_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(DESCRIPTION_FALLBACK_CHARS).collect();
    let cut = match cut.rfind(' ') {
        Some(idx) if idx > 0 => &cut[..idx],
        _ => cut.as_str(),
    };
    format!("{cut}…")
}

fn platform_label(platform: &str) -> &str {
    match platform {
        "youtube" => "YouTube",
        "vimeo" => "Vimeo",
        other => other,
    }
}

/// `my-first-post` -> `My first post`.
fn humanize(slug: &str) -> String {
    let spaced = slug.replace('-', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use curator_shared::{ClassifierBackendConfig, CuratorError, VideoRef};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedBackend {
        answer: Result<RemoteVerdict>,
        calls: AtomicU32,
    }

    impl FixedBackend {
        fn new(answer: Result<RemoteVerdict>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl ClassificationBackend for FixedBackend {
        async fn classify(&self, _request: &BackendRequest) -> Result<RemoteVerdict> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.answer {
                Ok(v) => Ok(v.clone()),
                Err(e) => Err(CuratorError::Classification(e.to_string())),
            }
        }
    }

    struct HangingBackend;

    #[async_trait]
    impl ClassificationBackend for HangingBackend {
        async fn classify(&self, _request: &BackendRequest) -> Result<RemoteVerdict> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(CuratorError::Classification("unreachable".into()))
        }
    }

    fn classifier() -> Classifier {
        Classifier::new(&ClassifierConfig::default())
    }

    fn record(url: &str) -> ExtractedRecord {
        ExtractedRecord::url_only(url, url)
    }

    #[test]
    fn threshold_bands() {
        let t = Thresholds::default();
        assert_eq!(t.band(0.85), ConfidenceBand::AutoPublish);
        assert_eq!(t.band(0.7), ConfidenceBand::AutoPublish);
        assert_eq!(t.band(0.69), ConfidenceBand::NeedsReview);
        assert_eq!(t.band(0.4), ConfidenceBand::NeedsReview);
        assert_eq!(t.band(0.39), ConfidenceBand::Unclassified);
    }

    #[test]
    fn thresholds_follow_config() {
        let config = ClassifierConfig {
            publish_threshold: 0.9,
            review_threshold: 0.2,
            ..ClassifierConfig::default()
        };
        let t = Thresholds::from(&config);
        assert_eq!(t.band(0.85), ConfidenceBand::NeedsReview);
        assert_eq!(t.band(0.25), ConfidenceBand::NeedsReview);
    }

    #[test]
    fn decisive_domain_is_auto_published() {
        let c = classifier().classify_local(record("https://www.reuters.com/world/acme-deal"));
        assert_eq!(c.category, Category::News);
        assert_eq!(c.confidence, 0.85);
        assert_eq!(c.band, ConfidenceBand::AutoPublish);
        assert_eq!(c.title, "Acme deal");
        assert_eq!(c.description, "");
        assert_eq!(c.url, "https://www.reuters.com/world/acme-deal");
    }

    #[test]
    fn low_confidence_becomes_unknown() {
        let mut r = record("https://example.org/page");
        r.title = Some("New toolkit released".into());
        let c = classifier().classify_local(r);
        assert!(c.confidence < 0.4);
        assert_eq!(c.category, Category::Unknown);
        assert_eq!(c.band, ConfidenceBand::Unclassified);
        assert_eq!(c.title, "New toolkit released");
    }

    #[test]
    fn mid_confidence_needs_review() {
        let mut r = record("https://example.org/docs/intro");
        r.title = Some("A practical guide and reference".into());
        let c = classifier().classify_local(r);
        assert_eq!(c.category, Category::Catalog);
        assert_eq!(c.band, ConfidenceBand::NeedsReview);
    }

    #[test]
    fn video_title_fallback() {
        let mut r = record("https://www.youtube.com/watch?v=abc123");
        r.metadata.video = Some(VideoRef {
            platform: "youtube".into(),
            id: "abc123".into(),
        });
        let c = classifier().classify_local(r);
        assert_eq!(c.category, Category::Video);
        assert_eq!(c.title, "YouTube video abc123");
    }

    #[test]
    fn description_falls_back_to_body_excerpt() {
        let mut r = record("https://example.org/a");
        r.body_text = Some("word ".repeat(100));
        let c = classifier().classify_local(r);
        assert!(c.description.ends_with('…'));
        assert!(c.description.chars().count() <= DESCRIPTION_FALLBACK_CHARS + 1);
    }

    #[test]
    fn host_is_last_resort_title() {
        let c = classifier().classify_local(record("https://example.org/"));
        assert_eq!(c.title, "example.org");
        assert_eq!(c.category, Category::Unknown);
    }

    #[tokio::test]
    async fn backend_consulted_below_publish_threshold() {
        let backend = FixedBackend::new(Ok(RemoteVerdict {
            category: Category::Catalog,
            confidence: 0.8,
            tags: vec!["rust".into()],
        }));
        let c = classifier().with_backend(backend.clone());

        let classified = c.classify(record("https://example.org/page")).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(classified.category, Category::Catalog);
        assert_eq!(classified.band, ConfidenceBand::AutoPublish);
        assert_eq!(classified.tags, vec!["rust"]);
    }

    #[tokio::test]
    async fn backend_skipped_for_decisive_records() {
        let backend = FixedBackend::new(Ok(RemoteVerdict {
            category: Category::Catalog,
            confidence: 0.99,
            tags: vec![],
        }));
        let c = classifier().with_backend(backend.clone());

        let classified = c.classify(record("https://www.bbc.com/news/x")).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(classified.category, Category::News);
    }

    #[tokio::test]
    async fn backend_failure_keeps_local_verdict() {
        let backend = FixedBackend::new(Err(CuratorError::Classification("boom".into())));
        let c = classifier().with_backend(backend);

        let mut r = record("https://example.org/docs/intro");
        r.title = Some("A practical guide and reference".into());
        let classified = c.classify(r).await;
        assert_eq!(classified.category, Category::Catalog);
        assert_eq!(classified.confidence, 0.55);
    }

    #[tokio::test(start_paused = true)]
    async fn backend_timeout_keeps_local_verdict() {
        let config = ClassifierConfig {
            backend: Some(ClassifierBackendConfig {
                endpoint: "http://unused".into(),
                api_key_env: None,
                timeout_secs: 1,
            }),
            ..ClassifierConfig::default()
        };
        let c = Classifier::new(&config).with_backend(Arc::new(HangingBackend));

        let classified = c.classify(record("https://example.org/page")).await;
        assert_eq!(classified.category, Category::Unknown);
        assert_eq!(classified.confidence, 0.0);
    }
}
