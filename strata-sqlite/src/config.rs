//! SQLite connection configuration.

use std::path::{Path, PathBuf};

use strata_catalog::Dialect;
use strata_migrate::{DriverCapabilities, MigrateResult, MigrationError};

/// Where the database lives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DatabasePath {
    /// Private in-memory database, gone when the connection closes.
    #[default]
    Memory,
    File(PathBuf),
}

impl DatabasePath {
    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JournalMode {
    /// Delete the rollback journal after each transaction.
    #[default]
    Delete,
    Truncate,
    Persist,
    Memory,
    /// Write-ahead logging.
    Wal,
}

impl JournalMode {
    pub fn as_pragma(&self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
            Self::Persist => "PERSIST",
            Self::Memory => "MEMORY",
            Self::Wal => "WAL",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "delete" => Some(Self::Delete),
            "truncate" => Some(Self::Truncate),
            "persist" => Some(Self::Persist),
            "memory" => Some(Self::Memory),
            "wal" => Some(Self::Wal),
            _ => None,
        }
    }
}

/// Settings applied when the migration connection opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    pub path: DatabasePath,
    /// Enforce foreign keys. Off by default so table rebuilds can drop and
    /// recreate referenced tables.
    pub foreign_keys: bool,
    /// How long a statement waits on a locked database before failing with
    /// `SQLITE_BUSY`.
    pub busy_timeout_ms: Option<u32>,
    pub journal_mode: JournalMode,
    /// Age in seconds after which a migration lock left by a runner that
    /// never released it is cleared. `None` keeps such locks forever.
    pub stale_lock_secs: Option<u64>,
}

/// Default age at which an unreleased migration lock is considered stale.
pub const DEFAULT_STALE_LOCK_SECS: u64 = 600;

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: DatabasePath::Memory,
            foreign_keys: false,
            busy_timeout_ms: Some(5000),
            journal_mode: JournalMode::Delete,
            stale_lock_secs: Some(DEFAULT_STALE_LOCK_SECS),
        }
    }
}

impl SqliteConfig {
    /// An in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// A file-based database.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            path: DatabasePath::File(path.as_ref().to_path_buf()),
            ..Default::default()
        }
    }

    /// Parse a DSN.
    ///
    /// Accepted forms: `:memory:`, `sqlite::memory:`, `sqlite://path`,
    /// `sqlite:path`, `file:path` or a bare path, each optionally followed by
    /// `?foreign_keys=1&busy_timeout=ms&journal_mode=wal&stale_lock=secs`.
    /// `stale_lock=0` never clears an unreleased lock.
    pub fn from_dsn(dsn: &str) -> MigrateResult<Self> {
        let stripped = DriverCapabilities::for_dialect(Dialect::Sqlite).preprocess_dsn(dsn.trim());
        let stripped = stripped.strip_prefix("file:").unwrap_or(&stripped);
        let (path, query) = match stripped.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (stripped, None),
        };

        let mut config = match path {
            ":memory:" => Self::memory(),
            "" => {
                return Err(MigrationError::other(format!(
                    "sqlite DSN {dsn} has no database path"
                )));
            }
            path => Self::file(path),
        };

        for pair in query.into_iter().flat_map(|q| q.split('&')) {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            match key {
                "mode" if value == "memory" => config.path = DatabasePath::Memory,
                "foreign_keys" => config.foreign_keys = value == "true" || value == "1",
                "busy_timeout" => {
                    config.busy_timeout_ms = Some(value.parse().map_err(|_| {
                        MigrationError::other(format!("invalid busy_timeout {value} in {dsn}"))
                    })?);
                }
                "journal_mode" => {
                    config.journal_mode = JournalMode::parse(value).ok_or_else(|| {
                        MigrationError::other(format!("invalid journal_mode {value} in {dsn}"))
                    })?;
                }
                "stale_lock" => {
                    let secs: u64 = value.parse().map_err(|_| {
                        MigrationError::other(format!("invalid stale_lock {value} in {dsn}"))
                    })?;
                    config.stale_lock_secs = (secs > 0).then_some(secs);
                }
                _ => {}
            }
        }
        Ok(config)
    }

    /// Pragmas run once on open.
    pub fn init_sql(&self) -> String {
        let mut sql = format!(
            "PRAGMA foreign_keys = {};\n",
            if self.foreign_keys { "ON" } else { "OFF" }
        );
        if !self.path.is_memory() {
            sql.push_str(&format!("PRAGMA journal_mode = {};\n", self.journal_mode.as_pragma()));
        }
        if let Some(timeout) = self.busy_timeout_ms {
            sql.push_str(&format!("PRAGMA busy_timeout = {timeout};\n"));
        }
        sql
    }

    /// Enable or disable foreign key enforcement.
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    /// Set the busy timeout in milliseconds.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = Some(ms);
        self
    }

    /// Set the journal mode.
    pub fn journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = mode;
        self
    }

    /// Set the age at which an unreleased lock is cleared, or `None` to
    /// keep it until released.
    pub fn stale_lock_secs(mut self, secs: Option<u64>) -> Self {
        self.stale_lock_secs = secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_from_dsn_forms() {
        assert_eq!(SqliteConfig::from_dsn(":memory:").unwrap().path, DatabasePath::Memory);
        assert_eq!(SqliteConfig::from_dsn("sqlite::memory:").unwrap().path, DatabasePath::Memory);
        assert_eq!(
            SqliteConfig::from_dsn("sqlite://data/app.db").unwrap().path,
            DatabasePath::File("data/app.db".into())
        );
        assert_eq!(
            SqliteConfig::from_dsn("file:app.db").unwrap().path,
            DatabasePath::File("app.db".into())
        );
        assert_eq!(
            SqliteConfig::from_dsn("app.sqlite3").unwrap().path,
            DatabasePath::File("app.sqlite3".into())
        );
        assert!(SqliteConfig::from_dsn("sqlite://").is_err());
    }

    #[test]
    fn test_from_dsn_options() {
        let config =
            SqliteConfig::from_dsn("sqlite:app.db?foreign_keys=1&busy_timeout=250&journal_mode=wal")
                .unwrap();
        assert!(config.foreign_keys);
        assert_eq!(config.busy_timeout_ms, Some(250));
        assert_eq!(config.journal_mode, JournalMode::Wal);

        assert_eq!(config.stale_lock_secs, Some(DEFAULT_STALE_LOCK_SECS));

        let config = SqliteConfig::from_dsn("app.db?stale_lock=30").unwrap();
        assert_eq!(config.stale_lock_secs, Some(30));
        let config = SqliteConfig::from_dsn("app.db?stale_lock=0").unwrap();
        assert_eq!(config.stale_lock_secs, None);

        assert!(SqliteConfig::from_dsn("app.db?stale_lock=later").is_err());
        assert!(SqliteConfig::from_dsn("app.db?busy_timeout=soon").is_err());
        assert!(SqliteConfig::from_dsn("app.db?journal_mode=off").is_err());
    }

    #[test]
    fn test_init_sql() {
        let sql = SqliteConfig::file("app.db").journal_mode(JournalMode::Wal).init_sql();
        assert_eq!(
            sql,
            "PRAGMA foreign_keys = OFF;\nPRAGMA journal_mode = WAL;\nPRAGMA busy_timeout = 5000;\n"
        );
        assert!(!SqliteConfig::memory().init_sql().contains("journal_mode"));
    }
}
