//! Optional remote classification service.
//!
//! The local rules handle the decisive cases. Records they are unsure about
//! can be sent to a remote model; its answer is only trusted after
//! validation, and any failure falls back to the local verdict.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use curator_shared::{Category, ClassifierBackendConfig, CuratorError, Result, secret_from_env};

// ---------------------------------------------------------------------------
// Protocol types
// ---------------------------------------------------------------------------

/// Payload sent to the backend for one record.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BackendRequest {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Raw backend answer, before validation.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct BackendVerdict {
    pub category: String,
    pub confidence: f64,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A backend answer that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteVerdict {
    pub category: Category,
    pub confidence: f64,
    pub tags: Vec<String>,
}

impl BackendVerdict {
    /// Reject unknown categories and out-of-range confidences.
    pub fn validate(self) -> Result<RemoteVerdict> {
        let category: Category = self
            .category
            .parse()
            .map_err(|e: String| CuratorError::Classification(format!("backend returned {e}")))?;

        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(CuratorError::Classification(format!(
                "backend confidence {} outside [0, 1]",
                self.confidence
            )));
        }

        let tags = self
            .tags
            .into_iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        Ok(RemoteVerdict {
            category,
            confidence: self.confidence,
            tags,
        })
    }
}

/// A remote service that can classify a record.
#[async_trait]
pub trait ClassificationBackend: Send + Sync {
    async fn classify(&self, request: &BackendRequest) -> Result<RemoteVerdict>;
}

// ---------------------------------------------------------------------------
// HTTP backend
// ---------------------------------------------------------------------------

/// JSON-over-HTTP backend: `POST endpoint` with a [`BackendRequest`] body.
pub struct HttpClassificationBackend {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpClassificationBackend {
    pub fn new(config: &ClassifierBackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CuratorError::Classification(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key_env.as_deref().and_then(secret_from_env),
        })
    }
}

#[async_trait]
impl ClassificationBackend for HttpClassificationBackend {
    async fn classify(&self, request: &BackendRequest) -> Result<RemoteVerdict> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CuratorError::Classification(format!("backend request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CuratorError::Classification(format!(
                "backend returned HTTP {}",
                status.as_u16()
            )));
        }

        let verdict: BackendVerdict = response
            .json()
            .await
            .map_err(|e| CuratorError::Classification(format!("malformed backend response: {e}")))?;

        debug!(url = %request.url, category = %verdict.category, confidence = verdict.confidence, "backend verdict");
        verdict.validate()
    }
}
