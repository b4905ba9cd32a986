//! Application configuration for curator.
//!
//! User config lives at `~/.curator/curator.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CuratorError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "curator.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".curator";

// ---------------------------------------------------------------------------
// Config structs (matching curator.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Orchestrator settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Fetch and parse settings.
    #[serde(default)]
    pub extractor: ExtractorConfig,

    /// Category scoring settings.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Content store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Webhook server settings.
    #[serde(default)]
    pub server: ServerConfig,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum items extracted/classified at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Upper bound for one item's extraction plus classification.
    #[serde(default = "default_item_timeout")]
    pub item_timeout_secs: u64,

    /// Upper bound for one store commit.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            item_timeout_secs: default_item_timeout(),
            store_timeout_secs: default_store_timeout(),
        }
    }
}

fn default_concurrency() -> u32 {
    4
}
fn default_item_timeout() -> u64 {
    45
}
fn default_store_timeout() -> u64 {
    30
}

/// `[extractor]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Per-request HTTP timeout.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Longest body excerpt kept per record.
    #[serde(default = "default_max_excerpt")]
    pub max_excerpt_chars: usize,

    /// Override for the outbound User-Agent header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Budget for all fetch attempts of one URL, retries included. When it
    /// runs out the record keeps just its URL.
    #[serde(default = "default_fetch_deadline")]
    pub deadline_secs: u64,

    /// Retry policy for transient fetch failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_excerpt_chars: default_max_excerpt(),
            user_agent: None,
            deadline_secs: default_fetch_deadline(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_fetch_timeout() -> u64 {
    20
}
fn default_fetch_deadline() -> u64 {
    30
}
fn default_max_excerpt() -> usize {
    600
}

/// `[extractor.retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Cap on any single delay.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Growth factor applied after each retry.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            multiplier: default_multiplier(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff() -> u64 {
    250
}
fn default_max_backoff() -> u64 {
    4000
}
fn default_multiplier() -> f64 {
    2.0
}

/// `[classifier]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Confidence at or above which a record is auto-published.
    #[serde(default = "default_publish_threshold")]
    pub publish_threshold: f64,

    /// Confidence below which a record is left unclassified.
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,

    /// Extra domains treated as news sources.
    #[serde(default)]
    pub news_domains: Vec<String>,

    /// Extra domains treated as catalog/resource sources.
    #[serde(default)]
    pub catalog_domains: Vec<String>,

    /// Extra domains treated as video hosts.
    #[serde(default)]
    pub video_domains: Vec<String>,

    /// Optional remote classification service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<ClassifierBackendConfig>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            publish_threshold: default_publish_threshold(),
            review_threshold: default_review_threshold(),
            news_domains: Vec::new(),
            catalog_domains: Vec::new(),
            video_domains: Vec::new(),
            backend: None,
        }
    }
}

fn default_publish_threshold() -> f64 {
    0.7
}
fn default_review_threshold() -> f64 {
    0.4
}

/// `[classifier.backend]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierBackendConfig {
    /// Endpoint receiving `POST {url, title, description, text}`.
    pub endpoint: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
}

fn default_backend_timeout() -> u64 {
    15
}

/// Which durable backend the content store writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendKind {
    #[default]
    Local,
    Github,
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackendKind,

    /// Directory inside the repository holding one file per category.
    #[serde(default = "default_content_dir")]
    pub content_dir: String,

    /// Root directory of the local repository (local backend only).
    #[serde(default = "default_local_root")]
    pub local_root: String,

    #[serde(default)]
    pub github: GithubConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackendKind::default(),
            content_dir: default_content_dir(),
            local_root: default_local_root(),
            github: GithubConfig::default(),
        }
    }
}

fn default_content_dir() -> String {
    "content".into()
}
fn default_local_root() -> String {
    "./content-repo".into()
}

/// `[store.github]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default)]
    pub owner: String,

    #[serde(default)]
    pub repo: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Name of the env var holding the access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            branch: default_branch(),
            token_env: default_token_env(),
            api_base: default_api_base(),
        }
    }
}

fn default_branch() -> String {
    "main".into()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".into()
}
fn default_api_base() -> String {
    "https://api.github.com".into()
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".into()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let c = &self.classifier;
        if !(0.0..=1.0).contains(&c.review_threshold) || !(0.0..=1.0).contains(&c.publish_threshold)
        {
            return Err(CuratorError::config("confidence thresholds must be within [0, 1]"));
        }
        if c.review_threshold > c.publish_threshold {
            return Err(CuratorError::config(format!(
                "review_threshold ({}) must not exceed publish_threshold ({})",
                c.review_threshold, c.publish_threshold
            )));
        }
        if self.pipeline.concurrency == 0 {
            return Err(CuratorError::config("pipeline.concurrency must be at least 1"));
        }
        if self.extractor.deadline_secs == 0
            || self.extractor.deadline_secs >= self.pipeline.item_timeout_secs
        {
            return Err(CuratorError::config(format!(
                "extractor.deadline_secs ({}) must be positive and below pipeline.item_timeout_secs ({})",
                self.extractor.deadline_secs, self.pipeline.item_timeout_secs
            )));
        }
        if self.extractor.retry.max_attempts == 0 {
            return Err(CuratorError::config("extractor.retry.max_attempts must be at least 1"));
        }
        if self.extractor.retry.multiplier < 1.0 {
            return Err(CuratorError::config("extractor.retry.multiplier must be >= 1.0"));
        }
        if self.store.backend == StoreBackendKind::Github
            && (self.store.github.owner.is_empty() || self.store.github.repo.is_empty())
        {
            return Err(CuratorError::config(
                "store.github.owner and store.github.repo are required for the github backend",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.curator/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| CuratorError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.curator/curator.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load and validate the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CuratorError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| CuratorError::config(format!("failed to parse {}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CuratorError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CuratorError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CuratorError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the env var named in config, if set and non-empty.
pub fn secret_from_env(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok().filter(|v| !v.is_empty())
}
