//! Logical column kinds and column type normalization.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::error::CatalogError;

/// The dialect-independent kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Binary,
    Boolean,
    Json,
    Number,
    String,
    Time,
    Uuid,
    Array,
    Enum,
    Any,
}

impl ColumnKind {
    pub const ALL: [ColumnKind; 10] = [
        ColumnKind::Binary,
        ColumnKind::Boolean,
        ColumnKind::Json,
        ColumnKind::Number,
        ColumnKind::String,
        ColumnKind::Time,
        ColumnKind::Uuid,
        ColumnKind::Array,
        ColumnKind::Enum,
        ColumnKind::Any,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Boolean => "boolean",
            Self::Json => "json",
            Self::Number => "number",
            Self::String => "string",
            Self::Time => "time",
            Self::Uuid => "uuid",
            Self::Array => "array",
            Self::Enum => "enum",
            Self::Any => "any",
        }
    }

    /// The column type used for this kind when no explicit type is given.
    pub fn default_type(&self, dialect: Dialect) -> &'static str {
        use Dialect::*;
        match (self, dialect) {
            (Self::Binary, Sqlite) => "BLOB",
            (Self::Binary, Postgres) => "BYTEA",
            (Self::Binary, Mysql) => "MEDIUMBLOB",
            (Self::Binary, Sqlserver) => "VARBINARY(MAX)",
            (Self::Boolean, Sqlserver) => "BIT",
            (Self::Boolean, _) => "BOOLEAN",
            (Self::Json, Sqlite | Mysql) => "JSON",
            (Self::Json, Postgres) => "JSONB",
            (Self::Json, Sqlserver) => "NVARCHAR(MAX)",
            (Self::Number, _) => "INT",
            (Self::String | Self::Enum, Sqlite | Postgres) => "TEXT",
            (Self::String | Self::Enum, Mysql) => "VARCHAR(255)",
            (Self::String | Self::Enum, Sqlserver) => "NVARCHAR(255)",
            (Self::Time, Postgres) => "TIMESTAMPTZ",
            (Self::Time, Sqlserver) => "DATETIMEOFFSET",
            (Self::Time, _) => "TIMESTAMP",
            (Self::Uuid, Sqlite | Postgres) => "UUID",
            (Self::Uuid, _) => "BINARY(16)",
            (Self::Array, Postgres) => "TEXT[]",
            (Self::Array, Sqlserver) => "NVARCHAR(MAX)",
            (Self::Array, _) => "JSON",
            (Self::Any, Sqlserver) => "NVARCHAR(MAX)",
            (Self::Any, _) => "TEXT",
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown column kind `{s}`"))
    }
}

/// A column type reduced to its canonical spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedType {
    /// Upper-cased base type with aliases folded, e.g. `VARCHAR`.
    pub name: String,
    /// Arguments inside the parentheses, whitespace removed.
    pub args: Vec<String>,
    /// Whether the type ended in `[]`.
    pub is_array: bool,
}

/// Aliases that name the same storage type.
const TYPE_ALIASES: &[(&str, &str)] = &[
    ("BIGSERIAL", "BIGINT"),
    ("BIT VARYING", "VARBIT"),
    ("BOOL", "BOOLEAN"),
    ("CHARACTER", "CHAR"),
    ("CHARACTER VARYING", "VARCHAR"),
    ("DECIMAL", "NUMERIC"),
    ("DOUBLE", "DOUBLE PRECISION"),
    ("FLOAT4", "REAL"),
    ("FLOAT8", "DOUBLE PRECISION"),
    ("INT2", "SMALLINT"),
    ("INT4", "INT"),
    ("INT8", "BIGINT"),
    ("SERIAL", "INT"),
    ("SMALLSERIAL", "SMALLINT"),
    ("TIME WITH TIME ZONE", "TIMETZ"),
    ("TIME WITHOUT TIME ZONE", "TIME"),
    ("TIMESTAMP WITH TIME ZONE", "TIMESTAMPTZ"),
    ("TIMESTAMP WITHOUT TIME ZONE", "TIMESTAMP"),
];

/// Normalize a raw column type for comparison and kind resolution.
///
/// `INTEGER` stays distinct from `INT` on sqlite, where only `INTEGER
/// PRIMARY KEY` aliases the rowid.
pub fn normalize_column_type(dialect: Dialect, column_type: &str) -> NormalizedType {
    let mut text = column_type.trim().to_ascii_uppercase();
    let is_array = text.ends_with("[]");
    if is_array {
        text.truncate(text.len() - 2);
    }

    let mut args = Vec::new();
    let mut base = String::with_capacity(text.len());
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in text.chars() {
        match ch {
            '(' => {
                if depth > 0 {
                    current.push(ch);
                }
                depth += 1;
            }
            ')' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    args.extend(
                        current
                            .split(',')
                            .map(|a| a.split_whitespace().collect::<String>())
                            .filter(|a| !a.is_empty()),
                    );
                    current.clear();
                } else {
                    current.push(ch);
                }
            }
            _ if depth > 0 => current.push(ch),
            _ => base.push(ch),
        }
    }

    let mut name = base.split_whitespace().collect::<Vec<_>>().join(" ");
    if let Some((_, canonical)) = TYPE_ALIASES.iter().find(|(alias, _)| *alias == name) {
        name = canonical.to_string();
    }
    if name == "INTEGER" && dialect != Dialect::Sqlite {
        name = "INT".to_string();
    }

    NormalizedType {
        name,
        args,
        is_array,
    }
}

/// Whether two raw column types name the same type under `dialect`.
pub fn types_equal(dialect: Dialect, a: &str, b: &str) -> bool {
    normalize_column_type(dialect, a) == normalize_column_type(dialect, b)
}

/// Map a raw column type onto its logical kind. Total: unknown types are
/// [`ColumnKind::Any`].
pub fn resolve_column_kind(dialect: Dialect, column_type: &str, is_enum: bool) -> ColumnKind {
    if is_enum {
        return ColumnKind::Enum;
    }
    let normalized = normalize_column_type(dialect, column_type);
    if normalized.is_array {
        return ColumnKind::Array;
    }
    let first_arg = normalized.args.first().map(String::as_str);
    match (normalized.name.as_str(), first_arg) {
        ("TINYINT", Some("1")) => return ColumnKind::Boolean,
        ("BINARY", Some("16")) => return ColumnKind::Uuid,
        _ => {}
    }
    match normalized.name.as_str() {
        "BYTEA" | "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB"
        | "VARBIT" => ColumnKind::Binary,
        "BOOLEAN" | "BIT" => ColumnKind::Boolean,
        "JSON" | "JSONB" => ColumnKind::Json,
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "NUMERIC"
        | "FLOAT" | "REAL" | "DOUBLE PRECISION" => ColumnKind::Number,
        "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "CHAR" | "VARCHAR" | "NCHAR"
        | "NVARCHAR" => ColumnKind::String,
        "DATE" | "TIME" | "TIMETZ" | "DATETIME" | "DATETIME2" | "SMALLDATETIME"
        | "DATETIMEOFFSET" | "TIMESTAMP" | "TIMESTAMPTZ" => ColumnKind::Time,
        "UUID" | "UNIQUEIDENTIFIER" => ColumnKind::Uuid,
        _ => ColumnKind::Any,
    }
}

/// Parse a kind name from declarative source, naming the column on failure.
pub(crate) fn parse_kind(table: &str, column: &str, text: &str) -> Result<ColumnKind, CatalogError> {
    text.parse()
        .map_err(|message: String| CatalogError::invalid_column(table, column, message))
}
