//! Content store: the versioned system of record.
//!
//! One file per persisted category (`<content_dir>/<category>.md`), written
//! whole on every change. Writes whose rendered content is byte-identical to
//! what is stored are skipped, so re-running a batch creates no new version.

pub mod backend;
pub mod format;
mod locks;

pub use backend::{FsBackend, GithubBackend, HISTORY_FILE, PutFileRequest, RemoteFile, StoreBackend};
pub use locks::{CategoryGuard, CategoryLocks};

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use curator_shared::{
    Category, ContentEntry, CuratorError, Result, StoreBackendKind, StoreConfig, StoreErrorKind,
};

/// Outcome of writing one category file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitResult {
    Committed { path: String, reference: String },
    /// Content was byte-identical; no version created.
    Unchanged { path: String },
}

impl CommitResult {
    pub fn path(&self) -> &str {
        match self {
            Self::Committed { path, .. } | Self::Unchanged { path } => path,
        }
    }

    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::Committed { reference, .. } => Some(reference),
            Self::Unchanged { .. } => None,
        }
    }
}

/// Upper bound for one backend call unless overridden.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// A write that stopped partway. `committed` already landed in the backend
/// and stays there; re-running the same write completes the rest.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct WriteError {
    /// Results for the categories handled before the failure.
    pub committed: Vec<CommitResult>,
    pub source: CuratorError,
}

impl WriteError {
    fn before_commit(source: CuratorError) -> Self {
        Self {
            committed: Vec::new(),
            source,
        }
    }

    /// Whether any category file was actually changed before the failure.
    pub fn is_partial(&self) -> bool {
        self.committed.iter().any(|c| c.reference().is_some())
    }
}

impl From<WriteError> for CuratorError {
    fn from(err: WriteError) -> Self {
        err.source
    }
}

pub struct ContentStore {
    backend: Arc<dyn StoreBackend>,
    content_dir: String,
    branch: String,
    locks: CategoryLocks,
    call_timeout: Duration,
}

impl ContentStore {
    pub fn new(backend: Arc<dyn StoreBackend>, content_dir: &str, branch: &str) -> Self {
        Self {
            backend,
            content_dir: content_dir.trim_matches('/').to_string(),
            branch: branch.to_string(),
            locks: CategoryLocks::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Bound every backend read and write by `timeout`.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Build the configured backend.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let backend: Arc<dyn StoreBackend> = match config.backend {
            StoreBackendKind::Local => Arc::new(FsBackend::new(&config.local_root)),
            StoreBackendKind::Github => Arc::new(GithubBackend::new(&config.github)?),
        };
        Ok(Self::new(backend, &config.content_dir, &config.github.branch))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn locks(&self) -> &CategoryLocks {
        &self.locks
    }

    /// Repository path of a category file.
    pub fn path_for(&self, category: Category) -> String {
        if self.content_dir.is_empty() {
            format!("{category}.md")
        } else {
            format!("{}/{category}.md", self.content_dir)
        }
    }

    /// All stored entries of `category`, in store order.
    #[instrument(skip_all, fields(category = %category))]
    pub async fn read_all(&self, category: Category) -> Result<Vec<ContentEntry>> {
        match category {
            Category::News | Category::Catalog | Category::Video => {}
            Category::Unknown => return Ok(Vec::new()),
        }
        let path = self.path_for(category);
        match self.get_file(&path).await? {
            Some(file) => format::parse(&file.content),
            None => Ok(Vec::new()),
        }
    }

    /// Entries of every persisted category.
    pub async fn snapshot(&self) -> Result<Vec<ContentEntry>> {
        let mut all = Vec::new();
        for category in Category::PERSISTED {
            all.extend(self.read_all(category).await?);
        }
        Ok(all)
    }

    /// Replace every persisted category file with its share of `entries`.
    ///
    /// Every category is rendered before the backend is touched, so a
    /// malformed entry fails the write with nothing committed. Categories are
    /// then written in [`Category::PERSISTED`] order; a backend failure stops
    /// the write and [`WriteError::committed`] lists what already landed. A
    /// category with no entries and no existing file is left alone.
    #[instrument(skip_all, fields(entries = entries.len(), backend = self.backend.name()))]
    pub async fn write(
        &self,
        entries: &[ContentEntry],
    ) -> std::result::Result<Vec<CommitResult>, WriteError> {
        let mut grouped: [Vec<ContentEntry>; 3] = Default::default();
        for entry in entries {
            let slot = match entry.category {
                Category::News => 0,
                Category::Catalog => 1,
                Category::Video => 2,
                Category::Unknown => {
                    return Err(WriteError::before_commit(CuratorError::store(
                        StoreErrorKind::MergeConflict,
                        format!("entry '{}' has no persisted category", entry.id),
                    )));
                }
            };
            grouped[slot].push(entry.clone());
        }

        let mut rendered = Vec::with_capacity(grouped.len());
        for (category, group) in Category::PERSISTED.into_iter().zip(grouped) {
            let content = format::render(&group).map_err(WriteError::before_commit)?;
            rendered.push((category, group.len(), content));
        }

        let mut results = Vec::with_capacity(rendered.len());
        for (category, count, content) in rendered {
            match self.write_category(category, count, content).await {
                Ok(result) => results.push(result),
                Err(source) => {
                    let err = WriteError {
                        committed: results,
                        source,
                    };
                    if err.is_partial() {
                        warn!(%category, error = %err.source, "write stopped after earlier categories were committed");
                    }
                    return Err(err);
                }
            }
        }
        Ok(results)
    }

    async fn write_category(
        &self,
        category: Category,
        count: usize,
        content: String,
    ) -> Result<CommitResult> {
        let path = self.path_for(category);
        let current = self.get_file(&path).await?;

        let sha = match current {
            Some(file) if file.content == content => {
                info!(path = %path, "content unchanged, skipping commit");
                return Ok(CommitResult::Unchanged { path });
            }
            None if count == 0 => return Ok(CommitResult::Unchanged { path }),
            Some(file) => Some(file.sha),
            None => None,
        };

        let request = PutFileRequest {
            path: path.clone(),
            content,
            message: format!("curator: update {category} ({count} entries)"),
            branch: self.branch.clone(),
            sha,
        };
        let reference = tokio::time::timeout(self.call_timeout, self.backend.put_file(request))
            .await
            .map_err(|_| self.timed_out("write", &path))??;

        info!(path = %path, commit = %reference, "category committed");
        Ok(CommitResult::Committed { path, reference })
    }

    async fn get_file(&self, path: &str) -> Result<Option<RemoteFile>> {
        tokio::time::timeout(self.call_timeout, self.backend.get_file(path))
            .await
            .map_err(|_| self.timed_out("read", path))?
    }

    fn timed_out(&self, what: &str, path: &str) -> CuratorError {
        CuratorError::store(
            StoreErrorKind::Timeout,
            format!("store {what} of {path} timed out after {}s", self.call_timeout.as_secs()),
        )
    }
}
