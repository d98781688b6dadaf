//! Error types for catalog construction and parsing.

// These warnings are false positives - the fields are used by derive macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors that can occur while building, parsing or loading a catalog.
#[derive(Error, Debug, Diagnostic)]
pub enum CatalogError {
    /// Error reading or writing a file.
    #[error("failed to access file: {path}")]
    #[diagnostic(code(strata::catalog::io_error))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Malformed modifier text.
    #[error("invalid modifier at offset {offset}: {message}")]
    #[diagnostic(code(strata::catalog::modifier_syntax))]
    ModifierSyntax {
        #[source_code]
        src: String,
        #[label("here")]
        span: miette::SourceSpan,
        offset: usize,
        message: String,
    },

    /// Syntax error in a declarative schema file.
    #[error("syntax error in declarative schema: {message}")]
    #[diagnostic(code(strata::catalog::syntax_error))]
    SyntaxError {
        #[source_code]
        src: String,
        #[label("error here")]
        span: miette::SourceSpan,
        message: String,
    },

    /// The dialect name is not one of the supported dialects.
    #[error("unknown dialect `{0}`")]
    #[diagnostic(
        code(strata::catalog::unknown_dialect),
        help("supported dialects are sqlite, postgres, mysql and sqlserver")
    )]
    UnknownDialect(String),

    /// Invalid table definition.
    #[error("invalid table `{table}`: {message}")]
    #[diagnostic(code(strata::catalog::invalid_table))]
    InvalidTable { table: String, message: String },

    /// Invalid column definition.
    #[error("invalid column `{table}.{column}`: {message}")]
    #[diagnostic(code(strata::catalog::invalid_column))]
    InvalidColumn {
        table: String,
        column: String,
        message: String,
    },

    /// A foreign key reference that cannot be resolved.
    #[error("invalid reference `{reference}` on table `{table}`: {message}")]
    #[diagnostic(code(strata::catalog::invalid_reference))]
    InvalidReference {
        table: String,
        reference: String,
        message: String,
    },

    /// Duplicate definition.
    #[error("duplicate {kind} `{name}`")]
    #[diagnostic(code(strata::catalog::duplicate))]
    Duplicate { kind: String, name: String },

    /// JSON snapshot could not be read or written.
    #[error("invalid catalog snapshot")]
    #[diagnostic(code(strata::catalog::json_error))]
    Json {
        #[source]
        source: serde_json::Error,
    },
}

impl CatalogError {
    /// Create a modifier syntax error pointing at `offset` within `src`.
    pub fn modifier_syntax(src: impl Into<String>, offset: usize, message: impl Into<String>) -> Self {
        let src = src.into();
        let len = usize::from(offset < src.len());
        Self::ModifierSyntax {
            src,
            span: (offset, len).into(),
            offset,
            message: message.into(),
        }
    }

    /// Create a syntax error with source location.
    pub fn syntax(
        src: impl Into<String>,
        offset: usize,
        len: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::SyntaxError {
            src: src.into(),
            span: (offset, len).into(),
            message: message.into(),
        }
    }

    /// Create an invalid table error.
    pub fn invalid_table(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTable {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create an invalid column error.
    pub fn invalid_column(
        table: impl Into<String>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidColumn {
            table: table.into(),
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create an invalid reference error.
    pub fn invalid_reference(
        table: impl Into<String>,
        reference: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidReference {
            table: table.into(),
            reference: reference.into(),
            message: message.into(),
        }
    }

    /// Create a duplicate definition error.
    pub fn duplicate(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Duplicate {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_syntax_span() {
        let err = CatalogError::modifier_syntax("index={a", 8, "unterminated `{`");
        match err {
            CatalogError::ModifierSyntax { offset, span, .. } => {
                assert_eq!(offset, 8);
                assert_eq!(span.len(), 0);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_error_names_object() {
        let err = CatalogError::invalid_column("film", "rating", "unknown kind `colour`");
        assert_eq!(
            err.to_string(),
            "invalid column `film.rating`: unknown kind `colour`"
        );
    }
}
