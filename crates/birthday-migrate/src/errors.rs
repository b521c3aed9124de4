use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Errors from loading the table configuration document.
///
/// Any of these aborts the run before the store is contacted.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The source could not be read.
    #[error("cannot read table configuration {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The source is not a well-formed table configuration document.
    #[error("malformed table configuration: {0}")]
    Malformed(#[from] serde_json::Error),
    /// A table definition violates a schema invariant.
    #[error("invalid definition for table '{table}': {reason}")]
    Invalid { table: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            table: table.into(),
            reason: reason.into(),
        }
    }
}

/// Classified errors from the table store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The table does not exist.
    #[error("table not found: {0}")]
    NotFound(String),
    /// The table already exists (or is being created).
    #[error("table already exists: {0}")]
    AlreadyExists(String),
    /// Credentials were rejected or lack permission.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The store could not be reached.
    #[error("store unreachable: {0}")]
    Unreachable(String),
    /// The operation did not finish within its bound.
    #[error("timed out after {} waiting for {name}", humantime::format_duration(*after))]
    Timeout { name: String, after: Duration },
    /// The run was interrupted.
    #[error("cancelled")]
    Cancelled,
    /// Any other store failure (invalid schema, limits, throttling, ...).
    #[error("store error: {0}")]
    Other(String),
}

/// Variant tag of a [`StoreError`], used in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreErrorKind {
    NotFound,
    AlreadyExists,
    Unauthorized,
    Unreachable,
    Timeout,
    Cancelled,
    Other,
}

impl StoreError {
    /// Check if this is an "already exists" error
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn kind(&self) -> StoreErrorKind {
        match self {
            StoreError::NotFound(_) => StoreErrorKind::NotFound,
            StoreError::AlreadyExists(_) => StoreErrorKind::AlreadyExists,
            StoreError::Unauthorized(_) => StoreErrorKind::Unauthorized,
            StoreError::Unreachable(_) => StoreErrorKind::Unreachable,
            StoreError::Timeout { .. } => StoreErrorKind::Timeout,
            StoreError::Cancelled => StoreErrorKind::Cancelled,
            StoreError::Other(_) => StoreErrorKind::Other,
        }
    }
}

/// Errors that end a `birthday-migrate` invocation.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// The table configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A store call outside reconciliation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The report could not be rendered.
    #[error("cannot render report: {0}")]
    Render(#[from] serde_json::Error),
}
