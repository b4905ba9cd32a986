//! Shared types, error model, and configuration for curator.
//!
//! This crate is the foundation depended on by all other curator crates.
//! It provides:
//! - [`CuratorError`]: the unified error type
//! - Domain types ([`RawInput`], [`ExtractedRecord`], [`ClassifiedRecord`], [`ContentEntry`], [`WorkflowResult`])
//! - Configuration ([`AppConfig`], config loading)
//! - URL canonicalisation ([`canonical_url`]) and slug helpers

pub mod canonical;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use canonical::{canonical_url, parse_http_url, short_hash, slug_from_url, slugify};
pub use config::{
    AppConfig, ClassifierBackendConfig, ClassifierConfig, ExtractorConfig, GithubConfig,
    PipelineConfig, RetryConfig, ServerConfig, StoreBackendKind, StoreConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, secret_from_env,
};
pub use error::{CuratorError, Result, StoreErrorKind};
pub use types::{
    Category, ClassifiedRecord, ConfidenceBand, ContentEntry, ContentType, ExtractedMetadata,
    ExtractedRecord, PublishStatus, RawInput, VideoRef, WorkflowResult, WorkflowState,
};
