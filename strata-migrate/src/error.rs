//! Error types for the migration engine.

use std::fmt;

use miette::Diagnostic;
use strata_catalog::CatalogError;
use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// A low-level error reported by a database driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseErrorInfo {
    /// Driver-specific code: a SQLSTATE, a vendor error number or a result
    /// code name such as `SQLITE_BUSY`.
    pub code: Option<String>,
    pub message: String,
}

impl DatabaseErrorInfo {
    pub fn new(code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for DatabaseErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Errors that can occur during migration operations.
#[derive(Debug, Error, Diagnostic)]
pub enum MigrationError {
    /// File system error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(strata::migrate::io_error))]
    Io(#[from] std::io::Error),

    /// Catalog parsing or loading error.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Catalog(#[from] CatalogError),

    /// Structurally malformed catalog input.
    #[error("Invalid catalog: {0}")]
    #[diagnostic(code(strata::migrate::invalid_catalog))]
    InvalidCatalog(String),

    /// A dialect with no engine or driver.
    #[error("Unsupported dialect: {0}")]
    #[diagnostic(code(strata::migrate::unsupported_dialect))]
    UnsupportedDialect(String),

    /// A source or operation this build cannot handle.
    #[error("Unsupported: {0}")]
    #[diagnostic(code(strata::migrate::unsupported))]
    Unsupported(String),

    /// Database operation error.
    #[error("Database error: {0}")]
    #[diagnostic(code(strata::migrate::database_error))]
    Database(DatabaseErrorInfo),

    /// A migration file failed to apply. Its transaction was rolled back.
    #[error("Migration '{file}' failed: {message}")]
    #[diagnostic(code(strata::migrate::execution_failed))]
    Execution { file: String, message: String },

    /// An applied migration's content changed on disk.
    #[error("Migration '{file}' has changed since it was applied: recorded checksum {expected}, file checksum {actual}")]
    #[diagnostic(code(strata::migrate::drift))]
    Drift {
        file: String,
        expected: String,
        actual: String,
    },

    /// Lock acquisition failed.
    #[error("Failed to acquire migration lock: {0}")]
    #[diagnostic(code(strata::migrate::lock_failed))]
    LockFailed(String),

    /// Migration file not found.
    #[error("Migration '{0}' not found")]
    #[diagnostic(code(strata::migrate::not_found))]
    NotFound(String),

    /// Generated warnings that the caller did not accept.
    #[error("{} warning(s) generated; pass accept-warnings to write the migration anyway", warnings.len())]
    #[diagnostic(
        code(strata::migrate::unaccepted_warnings),
        help("review the warnings, then rerun with --accept-warnings or --drop-objects")
    )]
    UnacceptedWarnings { warnings: Vec<String> },

    /// A migration could not be replayed into a catalog.
    #[error("Cannot replay '{file}': {message}")]
    #[diagnostic(code(strata::migrate::replay_failed))]
    Replay { file: String, message: String },

    /// The run was interrupted between files.
    #[error("Migration run cancelled")]
    #[diagnostic(code(strata::migrate::cancelled))]
    Cancelled,

    /// General migration error.
    #[error("Migration error: {0}")]
    #[diagnostic(code(strata::migrate::other))]
    Other(String),
}

impl MigrationError {
    /// Create a database error without a code.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(DatabaseErrorInfo::new(None, msg))
    }

    /// Create a database error carrying a driver code.
    pub fn database_code(code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Database(DatabaseErrorInfo::new(Some(code.into()), msg))
    }

    /// Create an invalid catalog error.
    pub fn invalid_catalog(msg: impl Into<String>) -> Self {
        Self::InvalidCatalog(msg.into())
    }

    /// Create a lock failed error.
    pub fn lock_failed(msg: impl Into<String>) -> Self {
        Self::LockFailed(msg.into())
    }

    /// Create a replay error for `file`.
    pub fn replay(file: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Replay {
            file: file.into(),
            message: msg.into(),
        }
    }

    /// Create an other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// The driver error behind this error, if any.
    pub fn database_info(&self) -> Option<&DatabaseErrorInfo> {
        match self {
            Self::Database(info) => Some(info),
            _ => None,
        }
    }

    /// Check if retrying the operation could succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::LockFailed(_) | Self::Cancelled)
    }
}
