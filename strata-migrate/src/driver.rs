//! Per-dialect driver capabilities.
//!
//! Drivers differ in how they report a lock timeout and in how a DSN has to
//! be massaged before connecting. Those rules are small function records
//! held by a [`DriverRegistry`], which the caller builds explicitly.

use std::fmt;

use indexmap::IndexMap;
use strata_catalog::Dialect;
use tracing::debug;
use url::Url;

use crate::error::{DatabaseErrorInfo, MigrateResult, MigrationError};

/// Error classification and DSN rules for one dialect's driver.
#[derive(Clone, Copy)]
pub struct DriverCapabilities {
    pub dialect: Dialect,
    pub driver_name: &'static str,
    lock_timeout: fn(&DatabaseErrorInfo) -> bool,
    dsn: fn(&str) -> String,
}

impl fmt::Debug for DriverCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverCapabilities")
            .field("dialect", &self.dialect)
            .field("driver_name", &self.driver_name)
            .finish_non_exhaustive()
    }
}

impl DriverCapabilities {
    pub fn new(
        dialect: Dialect,
        driver_name: &'static str,
        lock_timeout: fn(&DatabaseErrorInfo) -> bool,
        dsn: fn(&str) -> String,
    ) -> Self {
        Self {
            dialect,
            driver_name,
            lock_timeout,
            dsn,
        }
    }

    /// The built-in rules for `dialect`.
    pub fn for_dialect(dialect: Dialect) -> Self {
        match dialect {
            Dialect::Sqlite => Self::new(dialect, "sqlite", sqlite_lock_timeout, sqlite_dsn),
            Dialect::Postgres => Self::new(dialect, "postgres", postgres_lock_timeout, postgres_dsn),
            Dialect::Mysql => Self::new(dialect, "mysql", mysql_lock_timeout, |dsn| dsn.to_string()),
            Dialect::Sqlserver => {
                Self::new(dialect, "sqlserver", sqlserver_lock_timeout, |dsn| dsn.to_string())
            }
        }
    }

    /// Whether `error` means a lock could not be taken in time.
    pub fn is_lock_timeout(&self, error: &DatabaseErrorInfo) -> bool {
        (self.lock_timeout)(error)
    }

    /// Rewrite a DSN into the form the driver accepts.
    pub fn preprocess_dsn(&self, dsn: &str) -> String {
        (self.dsn)(dsn)
    }
}

fn code_is(error: &DatabaseErrorInfo, codes: &[&str]) -> bool {
    error
        .code
        .as_deref()
        .is_some_and(|code| codes.iter().any(|c| code.eq_ignore_ascii_case(c)))
}

fn sqlite_lock_timeout(error: &DatabaseErrorInfo) -> bool {
    code_is(error, &["SQLITE_BUSY", "SQLITE_LOCKED"])
}

fn postgres_lock_timeout(error: &DatabaseErrorInfo) -> bool {
    code_is(error, &["55P03"])
}

fn mysql_lock_timeout(error: &DatabaseErrorInfo) -> bool {
    code_is(error, &["1205", "3572"])
}

fn sqlserver_lock_timeout(error: &DatabaseErrorInfo) -> bool {
    code_is(error, &["1222"])
}

/// Strip the `sqlite:` scheme, leaving a file path.
fn sqlite_dsn(dsn: &str) -> String {
    dsn.strip_prefix("sqlite://")
        .or_else(|| dsn.strip_prefix("sqlite:"))
        .unwrap_or(dsn)
        .to_string()
}

/// Add `sslmode=disable` unless the DSN already sets an sslmode.
fn postgres_dsn(dsn: &str) -> String {
    if let Ok(mut url) = Url::parse(dsn) {
        if url.query_pairs().any(|(key, _)| key == "sslmode") {
            return dsn.to_string();
        }
        url.query_pairs_mut().append_pair("sslmode", "disable");
        return url.to_string();
    }
    // key=value form
    if dsn.split_whitespace().any(|pair| pair.starts_with("sslmode=")) {
        dsn.to_string()
    } else {
        format!("{} sslmode=disable", dsn.trim_end())
    }
}

/// Guess the dialect of a DSN from its scheme or, for bare paths, from a
/// SQLite file extension.
pub fn dialect_from_dsn(dsn: &str) -> Option<Dialect> {
    let dsn = dsn.trim();
    if dsn == ":memory:" {
        return Some(Dialect::Sqlite);
    }
    if let Some((scheme, _)) = dsn.split_once(':') {
        let dialect = match scheme.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" | "file" => Some(Dialect::Sqlite),
            "postgres" | "postgresql" => Some(Dialect::Postgres),
            "mysql" | "mariadb" => Some(Dialect::Mysql),
            "sqlserver" | "mssql" => Some(Dialect::Sqlserver),
            _ => None,
        };
        if dialect.is_some() {
            return dialect;
        }
    }
    let lower = dsn.to_ascii_lowercase();
    if [".db", ".sqlite", ".sqlite3"].iter().any(|ext| lower.ends_with(ext)) {
        return Some(Dialect::Sqlite);
    }
    None
}

/// Driver capabilities keyed by dialect.
#[derive(Debug, Clone, Default)]
pub struct DriverRegistry {
    drivers: IndexMap<Dialect, DriverCapabilities>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in rules for every dialect.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for dialect in Dialect::ALL {
            registry.register(DriverCapabilities::for_dialect(dialect));
        }
        registry
    }

    /// Add or replace the capabilities for a dialect.
    pub fn register(&mut self, capabilities: DriverCapabilities) {
        debug!(dialect = %capabilities.dialect, driver = capabilities.driver_name, "registered driver");
        self.drivers.insert(capabilities.dialect, capabilities);
    }

    pub fn get(&self, dialect: Dialect) -> Option<&DriverCapabilities> {
        self.drivers.get(&dialect)
    }

    /// Like [`get`](Self::get), failing for unregistered dialects.
    pub fn require(&self, dialect: Dialect) -> MigrateResult<&DriverCapabilities> {
        self.get(dialect)
            .ok_or_else(|| MigrationError::UnsupportedDialect(dialect.to_string()))
    }

    pub fn dialects(&self) -> impl Iterator<Item = Dialect> + '_ {
        self.drivers.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn error(code: &str) -> DatabaseErrorInfo {
        DatabaseErrorInfo::new(Some(code.to_string()), "failed")
    }

    #[test]
    fn test_lock_timeout_classification() {
        let registry = DriverRegistry::with_defaults();
        let caps = |d| registry.get(d).unwrap();
        assert!(caps(Dialect::Postgres).is_lock_timeout(&error("55P03")));
        assert!(!caps(Dialect::Postgres).is_lock_timeout(&error("42P01")));
        assert!(caps(Dialect::Mysql).is_lock_timeout(&error("1205")));
        assert!(caps(Dialect::Mysql).is_lock_timeout(&error("3572")));
        assert!(caps(Dialect::Sqlserver).is_lock_timeout(&error("1222")));
        assert!(caps(Dialect::Sqlite).is_lock_timeout(&error("SQLITE_BUSY")));
        assert!(caps(Dialect::Sqlite).is_lock_timeout(&error("SQLITE_LOCKED")));
        assert!(!caps(Dialect::Sqlite).is_lock_timeout(&DatabaseErrorInfo::new(None, "busy")));
    }

    #[test]
    fn test_preprocess_dsn() {
        let pg = DriverCapabilities::for_dialect(Dialect::Postgres);
        assert_eq!(
            pg.preprocess_dsn("postgres://u@localhost/db"),
            "postgres://u@localhost/db?sslmode=disable"
        );
        assert_eq!(
            pg.preprocess_dsn("postgres://u@localhost/db?sslmode=require"),
            "postgres://u@localhost/db?sslmode=require"
        );
        assert_eq!(pg.preprocess_dsn("host=localhost dbname=x"), "host=localhost dbname=x sslmode=disable");

        let sqlite = DriverCapabilities::for_dialect(Dialect::Sqlite);
        assert_eq!(sqlite.preprocess_dsn("sqlite://data/app.db"), "data/app.db");
        assert_eq!(sqlite.preprocess_dsn("sqlite:app.db"), "app.db");
        assert_eq!(sqlite.preprocess_dsn("app.db"), "app.db");
    }

    #[test]
    fn test_dialect_from_dsn() {
        assert_eq!(dialect_from_dsn("postgresql://localhost/x"), Some(Dialect::Postgres));
        assert_eq!(dialect_from_dsn("mariadb://localhost/x"), Some(Dialect::Mysql));
        assert_eq!(dialect_from_dsn("mssql://localhost/x"), Some(Dialect::Sqlserver));
        assert_eq!(dialect_from_dsn("sqlite:app.db"), Some(Dialect::Sqlite));
        assert_eq!(dialect_from_dsn("data/app.sqlite3"), Some(Dialect::Sqlite));
        assert_eq!(dialect_from_dsn(":memory:"), Some(Dialect::Sqlite));
        assert_eq!(dialect_from_dsn("schema.ddl"), None);
    }

    #[test]
    fn test_registry_is_explicit() {
        let mut registry = DriverRegistry::new();
        assert!(matches!(
            registry.require(Dialect::Mysql),
            Err(MigrationError::UnsupportedDialect(_))
        ));
        registry.register(DriverCapabilities::for_dialect(Dialect::Mysql));
        assert_eq!(registry.require(Dialect::Mysql).unwrap().driver_name, "mysql");
        assert_eq!(registry.dialects().collect::<Vec<_>>(), vec![Dialect::Mysql]);
    }
}
