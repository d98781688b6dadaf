//! CLI error types and result alias.

use miette::Diagnostic;
use strata_catalog::CatalogError;
use strata_migrate::MigrationError;
use thiserror::Error;

/// Result type alias for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// IO error
    #[error("IO error: {0}")]
    #[diagnostic(code(strata::io))]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    #[diagnostic(code(strata::config))]
    Config(String),

    /// Catalog parsing error, rendered with its source when it has one
    #[error(transparent)]
    #[diagnostic(transparent)]
    Catalog(CatalogError),

    /// Migration error
    #[error(transparent)]
    #[diagnostic(code(strata::migration))]
    Migration(MigrationError),

    /// Database error
    #[error("Database error: {0}")]
    #[diagnostic(code(strata::database))]
    Database(String),

    /// Command error
    #[error("{0}")]
    #[diagnostic(code(strata::command))]
    Command(String),
}

impl CliError {
    /// Whether the error carries source text worth rendering with labels.
    pub fn has_source_code(&self) -> bool {
        matches!(self, Self::Catalog(err) if err.source_code().is_some())
    }
}

impl From<CatalogError> for CliError {
    fn from(err: CatalogError) -> Self {
        Self::Catalog(err)
    }
}

impl From<MigrationError> for CliError {
    fn from(err: MigrationError) -> Self {
        match err {
            MigrationError::Catalog(err) => Self::Catalog(err),
            other => Self::Migration(other),
        }
    }
}

impl From<toml::de::Error> for CliError {
    fn from(err: toml::de::Error) -> Self {
        CliError::Config(format!("Failed to parse TOML: {}", err))
    }
}

impl From<toml::ser::Error> for CliError {
    fn from(err: toml::ser::Error) -> Self {
        CliError::Config(format!("Failed to serialize TOML: {}", err))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Command(format!("Failed to serialize JSON: {}", err))
    }
}
