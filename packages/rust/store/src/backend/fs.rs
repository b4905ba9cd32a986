//! Local directory backend.
//!
//! The directory plays the role of the repository: files are written in
//! place and every write appends a line to [`HISTORY_FILE`]. Versions are
//! content hashes.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use curator_shared::{CuratorError, Result, StoreErrorKind, short_hash};

use super::{PutFileRequest, RemoteFile, StoreBackend};

/// Append-only commit log kept at the backend root.
pub const HISTORY_FILE: &str = ".curator-history";

pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_)));
        if escapes || relative.as_os_str().is_empty() {
            return Err(CuratorError::store(
                StoreErrorKind::Backend,
                format!("refusing to write outside the content root: {path}"),
            ));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl StoreBackend for FsBackend {
    async fn get_file(&self, path: &str) -> Result<Option<RemoteFile>> {
        let full = self.resolve(path)?;
        match tokio::fs::read_to_string(&full).await {
            Ok(content) => Ok(Some(RemoteFile {
                sha: short_hash(&content),
                content,
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_store_error(&full, e)),
        }
    }

    #[instrument(skip_all, fields(path = %request.path))]
    async fn put_file(&self, request: PutFileRequest) -> Result<String> {
        let full = self.resolve(&request.path)?;

        let current = self.get_file(&request.path).await?.map(|f| f.sha);
        if current != request.sha {
            return Err(CuratorError::store(
                StoreErrorKind::Conflict,
                format!(
                    "{} changed underneath the write (expected {:?}, found {:?})",
                    request.path, request.sha, current
                ),
            ));
        }

        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_store_error(parent, e))?;
        }

        // write-then-rename so readers never see a half-written file
        let staging = full.with_extension("md.tmp");
        tokio::fs::write(&staging, request.content.as_bytes())
            .await
            .map_err(|e| io_store_error(&staging, e))?;
        tokio::fs::rename(&staging, &full)
            .await
            .map_err(|e| io_store_error(&full, e))?;

        let reference = short_hash(&request.content);
        let line = format!(
            "{}\t{}\t{}\t{}\t{}\n",
            Utc::now().to_rfc3339(),
            reference,
            request.branch,
            request.path,
            request.message.replace(['\n', '\t'], " ")
        );
        let history = self.root.join(HISTORY_FILE);
        let mut log = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&history)
            .await
            .map_err(|e| io_store_error(&history, e))?;
        log.write_all(line.as_bytes())
            .await
            .map_err(|e| io_store_error(&history, e))?;

        debug!(commit = %reference, "written");
        Ok(reference)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

fn io_store_error(path: &Path, e: std::io::Error) -> CuratorError {
    let kind = match e.kind() {
        ErrorKind::PermissionDenied => StoreErrorKind::Permission,
        _ => StoreErrorKind::Backend,
    };
    CuratorError::store(kind, format!("{}: {e}", path.display()))
}
