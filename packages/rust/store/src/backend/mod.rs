//! Durable backends behind the content store.

mod fs;
mod github;

pub use fs::{FsBackend, HISTORY_FILE};
pub use github::GithubBackend;

use async_trait::async_trait;

use curator_shared::Result;

/// Current state of a file in the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub content: String,
    /// Backend version of the file, passed back on update.
    pub sha: String,
}

/// Create-or-update request for one file.
#[derive(Debug, Clone)]
pub struct PutFileRequest {
    pub path: String,
    pub content: String,
    pub message: String,
    pub branch: String,
    /// Version the update is based on; `None` when creating the file.
    pub sha: Option<String>,
}

/// A versioned file store (a git hosting API, or a local directory).
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Fetch a file, or `None` if it does not exist yet.
    async fn get_file(&self, path: &str) -> Result<Option<RemoteFile>>;

    /// Create or update a file. Returns the commit reference.
    async fn put_file(&self, request: PutFileRequest) -> Result<String>;

    fn name(&self) -> &'static str;
}
