//! Supported SQL dialects.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// A SQL database family with its own DDL rendering and capability rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// The embedded, file-based dialect.
    Sqlite,
    Postgres,
    Mysql,
    Sqlserver,
}

/// Words that must be quoted when used as identifiers in any dialect.
const RESERVED_WORDS: &[&str] = &[
    "all", "alter", "and", "as", "asc", "between", "by", "case", "check", "column", "constraint",
    "create", "cross", "default", "delete", "desc", "distinct", "drop", "else", "end", "except",
    "exists", "foreign", "from", "full", "group", "having", "in", "index", "inner", "insert",
    "intersect", "into", "is", "join", "key", "left", "like", "limit", "not", "null", "offset",
    "on", "or", "order", "outer", "primary", "references", "right", "select", "set", "table",
    "then", "to", "union", "unique", "update", "user", "using", "values", "view", "when",
    "where", "with",
];

impl Dialect {
    /// Every supported dialect.
    pub const ALL: [Dialect; 4] = [
        Dialect::Sqlite,
        Dialect::Postgres,
        Dialect::Mysql,
        Dialect::Sqlserver,
    ];

    /// The canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Sqlserver => "sqlserver",
        }
    }

    /// The schema a connection uses when none is named.
    pub fn default_schema(&self) -> &'static str {
        match self {
            Self::Sqlite => "main",
            Self::Postgres => "public",
            Self::Mysql => "",
            Self::Sqlserver => "dbo",
        }
    }

    /// Whether the dialect has CREATE SCHEMA / DROP SCHEMA.
    pub fn supports_schemas(&self) -> bool {
        !matches!(self, Self::Sqlite)
    }

    /// Compare two identifiers under this dialect's case rules.
    ///
    /// Postgres folds unquoted identifiers but preserves quoted ones, and the
    /// catalog always holds the stored name, so comparison there is exact.
    pub fn names_equal(&self, a: &str, b: &str) -> bool {
        match self {
            Self::Postgres => a == b,
            _ => a.eq_ignore_ascii_case(b),
        }
    }

    /// A lookup key for an identifier under this dialect's case rules.
    pub fn fold(&self, name: &str) -> String {
        match self {
            Self::Postgres => name.to_string(),
            _ => name.to_ascii_lowercase(),
        }
    }

    /// Quote an identifier if it would not survive unquoted.
    pub fn quote_identifier(&self, name: &str) -> String {
        if !needs_quoting(name) {
            return name.to_string();
        }
        match self {
            Self::Sqlite | Self::Postgres => format!("\"{}\"", name.replace('"', "\"\"")),
            Self::Mysql => format!("`{}`", name.replace('`', "``")),
            Self::Sqlserver => format!("[{}]", name.replace(']', "]]")),
        }
    }

    /// Quote a possibly schema-qualified object name.
    pub fn quote_qualified(&self, schema: &str, name: &str) -> String {
        if schema.is_empty() {
            self.quote_identifier(name)
        } else {
            format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(name)
            )
        }
    }

    /// Quote a SQL string literal.
    pub fn quote_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }
}

/// An identifier needs quoting unless it is lowercase ASCII, digits and
/// underscores, does not start with a digit and is not a reserved word.
pub fn needs_quoting(identifier: &str) -> bool {
    if identifier.is_empty() {
        return true;
    }
    for (i, ch) in identifier.chars().enumerate() {
        if i == 0 && ch.is_ascii_digit() {
            return true;
        }
        if ch == '_' || ch.is_ascii_digit() || ch.is_ascii_lowercase() {
            continue;
        }
        return true;
    }
    RESERVED_WORDS.binary_search(&identifier).is_ok()
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::Mysql),
            "sqlserver" | "mssql" => Ok(Self::Sqlserver),
            _ => Err(CatalogError::UnknownDialect(s.to_string())),
        }
    }
}
