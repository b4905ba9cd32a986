//! Error types for curator.
//!
//! Library crates use [`CuratorError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Machine-readable classification of a content store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Credentials missing or rejected by the backend.
    Auth,
    /// Credentials accepted but not allowed to write.
    Permission,
    /// The stored version moved underneath us (stale sha, concurrent edit).
    Conflict,
    /// Repository, branch or path does not exist.
    NotFound,
    /// The backend did not answer in time.
    Timeout,
    /// Any other backend failure (5xx, transport, malformed reply).
    Backend,
    /// A stored file could not be parsed or rendered.
    Format,
    /// The reconciler produced an inconsistent set (duplicate ids or keys).
    MergeConflict,
}

impl StoreErrorKind {
    /// Stable lowercase name used in logs and JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Permission => "permission",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::Backend => "backend",
            Self::Format => "format",
            Self::MergeConflict => "merge_conflict",
        }
    }

    /// Map an HTTP status from a versioned-storage API to an error kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Auth,
            403 => Self::Permission,
            404 => Self::NotFound,
            409 | 422 => Self::Conflict,
            _ => Self::Backend,
        }
    }
}

impl std::fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for all curator operations.
#[derive(Debug, thiserror::Error)]
pub enum CuratorError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Malformed input item (URL, email payload). Rejects the item only.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Fetch or parse failure that could not be degraded to a partial record.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// The resource could not be reached (DNS, connect, non-2xx after retry).
    #[error("unreachable resource {url}: {reason}")]
    Unreachable { url: String, reason: String },

    /// Remote classification backend failure.
    #[error("classification error: {0}")]
    Classification(String),

    /// Content store failure. Always fatal to the run.
    #[error("store error ({kind}): {message}")]
    Store {
        kind: StoreErrorKind,
        message: String,
    },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The triggering context was cancelled before persistence.
    #[error("run cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CuratorError>;

impl CuratorError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an invalid-input error from any displayable message.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    /// Create a store error of the given kind.
    pub fn store(kind: StoreErrorKind, msg: impl Into<String>) -> Self {
        Self::Store {
            kind,
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must abort the whole run rather than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store { .. } | Self::Cancelled | Self::Config { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = CuratorError::config("publish_threshold out of range");
        assert_eq!(err.to_string(), "config error: publish_threshold out of range");

        let err = CuratorError::store(StoreErrorKind::Auth, "bad credentials");
        assert_eq!(err.to_string(), "store error (auth): bad credentials");
    }

    #[test]
    fn status_mapping() {
        assert_eq!(StoreErrorKind::from_status(401), StoreErrorKind::Auth);
        assert_eq!(StoreErrorKind::from_status(403), StoreErrorKind::Permission);
        assert_eq!(StoreErrorKind::from_status(409), StoreErrorKind::Conflict);
        assert_eq!(StoreErrorKind::from_status(502), StoreErrorKind::Backend);
    }

    #[test]
    fn only_store_level_errors_are_fatal() {
        assert!(CuratorError::store(StoreErrorKind::Conflict, "sha").is_fatal());
        assert!(CuratorError::Cancelled.is_fatal());
        assert!(!CuratorError::invalid_input("ftp://x").is_fatal());
        assert!(
            !CuratorError::Unreachable {
                url: "https://a.example".into(),
                reason: "dns".into()
            }
            .is_fatal()
        );
    }
}
