//! Core domain types for the ingestion pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// Closed set of content categories.
///
/// `Unknown` is never persisted; it marks records routed to manual triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    News,
    Catalog,
    Video,
    Unknown,
}

impl Category {
    /// Categories the content store keeps a file for, in lock order.
    pub const PERSISTED: [Category; 3] = [Category::News, Category::Catalog, Category::Video];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Catalog => "catalog",
            Self::Video => "video",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_persisted(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "news" => Ok(Self::News),
            "catalog" | "catalog-resource" | "resource" | "resources" => Ok(Self::Catalog),
            "video" | "videos" => Ok(Self::Video),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown category '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// ContentType
// ---------------------------------------------------------------------------

/// Content-type tag assigned by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Article,
    Video,
    Pdf,
    Report,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Video => "video",
            Self::Pdf => "pdf",
            Self::Report => "report",
        }
    }
}

// ---------------------------------------------------------------------------
// RawInput
// ---------------------------------------------------------------------------

/// One inbound unit from the email/webhook collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInput {
    pub sender: String,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub urls: Vec<String>,
    /// Free-text email body; URLs found in it are harvested too.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

// ---------------------------------------------------------------------------
// ExtractedRecord
// ---------------------------------------------------------------------------

/// Platform-specific reference for video URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRef {
    /// Adapter name, e.g. `youtube`.
    pub platform: String,
    /// Platform-specific video identifier.
    pub id: String,
}

/// Optional metadata the extractor may or may not be able to populate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// Normalized output of the extractor. Only `url` is guaranteed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    /// Canonical URL (dedup key).
    pub url: String,
    /// URL as it was received.
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_text: Option<String>,
    #[serde(default)]
    pub metadata: ExtractedMetadata,
    /// When the referencing input arrived; set by the orchestrator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
}

impl ExtractedRecord {
    /// A record carrying nothing but its URL (partial extraction).
    pub fn url_only(canonical: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            url: canonical.into(),
            source_url: source.into(),
            title: None,
            description: None,
            body_text: None,
            metadata: ExtractedMetadata::default(),
            received_at: None,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.body_text.is_none()
    }
}

// ---------------------------------------------------------------------------
// ClassifiedRecord
// ---------------------------------------------------------------------------

/// Confidence band a classified record falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfidenceBand {
    AutoPublish,
    NeedsReview,
    Unclassified,
}

/// Extracted record plus category, confidence and display fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedRecord {
    pub record: ExtractedRecord,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    pub band: ConfidenceBand,
    /// Display title, never empty.
    pub title: String,
    /// Display description, may be empty.
    pub description: String,
    /// Display URL (canonical).
    pub url: String,
}

// ---------------------------------------------------------------------------
// ContentEntry
// ---------------------------------------------------------------------------

/// Publication state of a persisted entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Published,
    Review,
}

/// The durable record kept in the content store.
///
/// Field order matters: it is the order keys appear in the stored header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentEntry {
    /// Slug, unique within `category`.
    pub id: String,
    pub category: Category,
    /// Canonical URL (dedup key).
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: PublishStatus,
    #[serde(default)]
    pub featured: bool,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub last_modified: DateTime<Utc>,
    /// Free-text excerpt; stored as the body, not in the header.
    #[serde(skip)]
    pub excerpt: Option<String>,
}

impl ContentEntry {
    /// Date used for ordering: publish date, else received date.
    pub fn sort_date(&self) -> Option<DateTime<Utc>> {
        self.published_at.or(self.received_at)
    }
}

// ---------------------------------------------------------------------------
// WorkflowResult
// ---------------------------------------------------------------------------

/// Orchestrator state over one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    Idle,
    Extracting,
    Classifying,
    Reconciling,
    Persisting,
    Done,
    Failed,
}

/// Outcome of one orchestration run. Returned and logged, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    pub run_id: String,
    pub success: bool,
    pub state: WorkflowState,
    pub processed_count: usize,
    /// One message per failed item, in input order.
    pub errors: Vec<String>,
    pub created_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_ref: Option<String>,
    /// URLs classified `unknown`, left for manual triage.
    #[serde(default)]
    pub triage: Vec<String>,
    /// URLs persisted with `review` status.
    #[serde(default)]
    pub needs_review: Vec<String>,
    #[serde(default)]
    pub added: usize,
    #[serde(default)]
    pub updated: usize,
    #[serde(default)]
    pub skipped: usize,
}

impl WorkflowResult {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            success: false,
            state: WorkflowState::Idle,
            processed_count: 0,
            errors: Vec::new(),
            created_files: Vec::new(),
            commit_ref: None,
            triage: Vec::new(),
            needs_review: Vec::new(),
            added: 0,
            updated: 0,
            skipped: 0,
        }
    }
}
