//! Deterministic classification rules.
//!
//! Decisive signals (video platform, known domains, document types) are
//! checked first. Ambiguous records fall through to a keyword/path score.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use curator_shared::{Category, ClassifierConfig, ContentType, ExtractedRecord};

const BUILTIN_VIDEO_DOMAINS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "vimeo.com",
    "twitch.tv",
    "dailymotion.com",
    "ted.com",
];

const BUILTIN_NEWS_DOMAINS: &[&str] = &[
    "reuters.com",
    "apnews.com",
    "bbc.com",
    "bbc.co.uk",
    "nytimes.com",
    "theguardian.com",
    "techcrunch.com",
    "theverge.com",
    "arstechnica.com",
    "wired.com",
    "bloomberg.com",
    "axios.com",
];

const BUILTIN_CATALOG_DOMAINS: &[&str] = &[
    "github.com",
    "gitlab.com",
    "crates.io",
    "docs.rs",
    "pypi.org",
    "npmjs.com",
    "arxiv.org",
    "coursera.org",
    "huggingface.co",
];

const NEWS_KEYWORDS: &[&str] = &[
    "announce",
    "announces",
    "announced",
    "launch",
    "launches",
    "launched",
    "release",
    "released",
    "breaking",
    "today",
    "acquires",
    "acquisition",
    "funding",
    "raises",
    "partnership",
    "unveils",
    "report",
];

const CATALOG_KEYWORDS: &[&str] = &[
    "guide",
    "tutorial",
    "handbook",
    "documentation",
    "docs",
    "course",
    "toolkit",
    "template",
    "library",
    "framework",
    "reference",
    "cheatsheet",
    "resources",
    "learn",
    "dataset",
];

/// Confidence for a URL that resolved to a specific video.
const VIDEO_REF_CONFIDENCE: f64 = 0.95;
/// Confidence for a record on a known domain without a decisive id.
const DOMAIN_CONFIDENCE: f64 = 0.85;
/// Confidence for PDFs and reports.
const DOCUMENT_CONFIDENCE: f64 = 0.75;

const KEYWORD_WEIGHT: f64 = 0.15;
const MAX_KEYWORD_HITS: usize = 4;
const PATH_WEIGHT: f64 = 0.25;
const DATE_WEIGHT: f64 = 0.15;

static NEWS_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)/(news|press|blog|stories|article|articles)/|/20\d\d/").expect("valid regex")
});

static CATALOG_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)/(docs|guide|guides|resources|learn|tutorials?|library|catalog)(/|$)")
        .expect("valid regex")
});

/// The rule engine's answer for one record, before thresholds are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub category: Category,
    pub confidence: f64,
    pub subcategory: Option<String>,
    pub tags: Vec<String>,
}

impl Verdict {
    fn unknown() -> Self {
        Self {
            category: Category::Unknown,
            confidence: 0.0,
            subcategory: None,
            tags: Vec::new(),
        }
    }
}

/// Domain lists (built-in plus configured) used by the decisive rules.
#[derive(Debug, Clone)]
pub struct RuleSet {
    video_domains: Vec<String>,
    news_domains: Vec<String>,
    catalog_domains: Vec<String>,
}

impl RuleSet {
    pub fn new(config: &ClassifierConfig) -> Self {
        fn merged(builtin: &[&str], extra: &[String]) -> Vec<String> {
            builtin
                .iter()
                .map(|d| d.to_string())
                .chain(extra.iter().map(|d| d.trim().to_ascii_lowercase()))
                .filter(|d| !d.is_empty())
                .collect()
        }

        Self {
            video_domains: merged(BUILTIN_VIDEO_DOMAINS, &config.video_domains),
            news_domains: merged(BUILTIN_NEWS_DOMAINS, &config.news_domains),
            catalog_domains: merged(BUILTIN_CATALOG_DOMAINS, &config.catalog_domains),
        }
    }

    /// Evaluate a record. Never fails; the worst case is `Unknown` at 0.
    pub fn evaluate(&self, record: &ExtractedRecord) -> Verdict {
        let Ok(url) = Url::parse(&record.url) else {
            return Verdict::unknown();
        };
        let host = url
            .host_str()
            .map(|h| h.trim_start_matches("www.").to_ascii_lowercase())
            .unwrap_or_default();

        if let Some(video) = &record.metadata.video {
            return Verdict {
                category: Category::Video,
                confidence: VIDEO_REF_CONFIDENCE,
                subcategory: Some(video.platform.clone()),
                tags: Vec::new(),
            };
        }

        if record.metadata.content_type == Some(ContentType::Video)
            || domain_listed(&host, &self.video_domains)
        {
            return Verdict {
                category: Category::Video,
                confidence: DOMAIN_CONFIDENCE,
                subcategory: Some(host),
                tags: Vec::new(),
            };
        }

        if domain_listed(&host, &self.news_domains) {
            return Verdict {
                category: Category::News,
                confidence: DOMAIN_CONFIDENCE,
                subcategory: Some(host),
                tags: Vec::new(),
            };
        }

        if domain_listed(&host, &self.catalog_domains) {
            return Verdict {
                category: Category::Catalog,
                confidence: DOMAIN_CONFIDENCE,
                subcategory: Some(host),
                tags: Vec::new(),
            };
        }

        match record.metadata.content_type {
            Some(ContentType::Report) => {
                return Verdict {
                    category: Category::Catalog,
                    confidence: DOCUMENT_CONFIDENCE,
                    subcategory: Some("report".into()),
                    tags: Vec::new(),
                };
            }
            Some(ContentType::Pdf) => {
                return Verdict {
                    category: Category::Catalog,
                    confidence: DOCUMENT_CONFIDENCE,
                    subcategory: Some("document".into()),
                    tags: Vec::new(),
                };
            }
            _ => {}
        }

        score(record, url.path())
    }
}

/// Whether `host` is `domain` or one of its subdomains.
fn domain_listed(host: &str, domains: &[String]) -> bool {
    domains
        .iter()
        .any(|d| host == d || host.ends_with(&format!(".{d}")))
}

/// Keyword/path score for records no decisive rule matched.
fn score(record: &ExtractedRecord, path: &str) -> Verdict {
    let text = [record.title.as_deref(), record.description.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let words: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let news_hits = keyword_hits(&words, NEWS_KEYWORDS);
    let catalog_hits = keyword_hits(&words, CATALOG_KEYWORDS);

    let mut news = hits_weight(&news_hits);
    let mut catalog = hits_weight(&catalog_hits);

    if NEWS_PATH_RE.is_match(path) {
        news += PATH_WEIGHT;
    }
    if CATALOG_PATH_RE.is_match(path) {
        catalog += PATH_WEIGHT;
    }
    if record.metadata.published_at.is_some() {
        news += DATE_WEIGHT;
    }

    let (category, best, second, hits) = if news >= catalog {
        (Category::News, news, catalog, news_hits)
    } else {
        (Category::Catalog, catalog, news, catalog_hits)
    };

    if best <= 0.0 {
        return Verdict::unknown();
    }

    let confidence = (best.min(1.0) - 0.5 * second.min(1.0)).clamp(0.0, 1.0);
    Verdict {
        category,
        confidence: round2(confidence),
        subcategory: None,
        tags: hits,
    }
}

/// Keywords present in `words`, in keyword-list order.
fn keyword_hits(words: &[&str], keywords: &[&str]) -> Vec<String> {
    keywords
        .iter()
        .filter(|k| words.contains(*k))
        .map(|k| k.to_string())
        .collect()
}

fn hits_weight(hits: &[String]) -> f64 {
    hits.len().min(MAX_KEYWORD_HITS) as f64 * KEYWORD_WEIGHT
}

/// Round to two decimals so scores compare stably across runs.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
