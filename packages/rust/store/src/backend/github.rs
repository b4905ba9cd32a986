//! GitHub contents API backend.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use curator_shared::{CuratorError, GithubConfig, Result, StoreErrorKind, secret_from_env};

use super::{PutFileRequest, RemoteFile, StoreBackend};

const USER_AGENT: &str = concat!("curator/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct GithubBackend {
    client: Client,
    api_base: String,
    owner: String,
    repo: String,
    branch: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutBody<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    commit: CommitInfo,
}

#[derive(Debug, Deserialize)]
struct CommitInfo {
    sha: String,
}

impl GithubBackend {
    /// Build from config. The token is read from the configured env var.
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let token = secret_from_env(&config.token_env).ok_or_else(|| {
            CuratorError::store(
                StoreErrorKind::Auth,
                format!("environment variable {} is not set", config.token_env),
            )
        })?;
        Self::with_token(config, token)
    }

    pub fn with_token(config: &GithubConfig, token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                CuratorError::store(StoreErrorKind::Backend, format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            branch: config.branch.clone(),
            token: token.into(),
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base,
            self.owner,
            self.repo,
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl StoreBackend for GithubBackend {
    #[instrument(skip_all, fields(path = %path))]
    async fn get_file(&self, path: &str) -> Result<Option<RemoteFile>> {
        let response = self
            .client
            .get(self.contents_url(path))
            .query(&[("ref", self.branch.as_str())])
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(path, "file does not exist yet");
            return Ok(None);
        }
        let response = check_status(response).await?;

        let body: ContentsResponse = response.json().await.map_err(|e| {
            CuratorError::store(StoreErrorKind::Backend, format!("malformed contents response: {e}"))
        })?;

        if body.encoding.as_deref().is_some_and(|enc| enc != "base64") {
            return Err(CuratorError::store(
                StoreErrorKind::Backend,
                format!("unsupported content encoding for {path}"),
            ));
        }

        let packed: String = body.content.split_whitespace().collect();
        let bytes = general_purpose::STANDARD.decode(packed).map_err(|e| {
            CuratorError::store(StoreErrorKind::Format, format!("invalid base64 in {path}: {e}"))
        })?;
        let content = String::from_utf8(bytes).map_err(|e| {
            CuratorError::store(StoreErrorKind::Format, format!("{path} is not UTF-8: {e}"))
        })?;

        Ok(Some(RemoteFile {
            content,
            sha: body.sha,
        }))
    }

    #[instrument(skip_all, fields(path = %request.path, branch = %request.branch))]
    async fn put_file(&self, request: PutFileRequest) -> Result<String> {
        let body = PutBody {
            message: &request.message,
            content: general_purpose::STANDARD.encode(request.content.as_bytes()),
            branch: &request.branch,
            sha: request.sha.as_deref(),
        };

        let response = self
            .client
            .put(self.contents_url(&request.path))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;

        let put: PutResponse = response.json().await.map_err(|e| {
            CuratorError::store(StoreErrorKind::Backend, format!("malformed commit response: {e}"))
        })?;
        debug!(commit = %put.commit.sha, "committed");
        Ok(put.commit.sha)
    }

    fn name(&self) -> &'static str {
        "github"
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());

    Err(CuratorError::store(
        StoreErrorKind::from_status(status.as_u16()),
        format!("GitHub returned {}: {detail}", status.as_u16()),
    ))
}

fn transport_error(e: reqwest::Error) -> CuratorError {
    let kind = if e.is_timeout() {
        StoreErrorKind::Timeout
    } else {
        StoreErrorKind::Backend
    };
    CuratorError::store(kind, format!("GitHub request failed: {e}"))
}
