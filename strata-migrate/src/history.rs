//! Migration history tracking.
//!
//! One row per applied file: `filename` (primary key), `checksum` and
//! `applied_at`. The SQL that maintains the table and the migration-wide lock
//! differs per dialect and is collected in [`HistorySql`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strata_catalog::Dialect;

use crate::file::MigrationFile;

/// Default name of the history table.
pub const DEFAULT_HISTORY_TABLE: &str = "strata_history";

/// A record of an applied migration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub filename: String,
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
}

impl HistoryRecord {
    /// A record stamped with the current time.
    pub fn new(filename: impl Into<String>, checksum: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            checksum: checksum.into(),
            applied_at: Utc::now(),
        }
    }

    /// A record for `file` with its current checksum.
    pub fn for_file(file: &MigrationFile) -> Self {
        Self::new(&file.filename, &file.checksum)
    }
}

/// `applied_at` as stored in text columns.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored `applied_at` value.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Name of the lock table used where the database has no advisory locks.
pub fn lock_table_name(history_table: &str) -> String {
    format!("{history_table}_lock")
}

/// History and lock statements for one dialect and history table.
///
/// Upserts take three parameters in order: filename, checksum, applied_at.
#[derive(Debug, Clone)]
pub struct HistorySql {
    dialect: Dialect,
    table: String,
}

impl HistorySql {
    pub fn new(dialect: Dialect, table: impl Into<String>) -> Self {
        Self {
            dialect,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn quoted(&self) -> String {
        self.dialect.quote_identifier(&self.table)
    }

    pub fn create_table(&self) -> String {
        let table = self.quoted();
        match self.dialect {
            Dialect::Sqlite => format!(
                "CREATE TABLE IF NOT EXISTS {table} (\n    filename TEXT PRIMARY KEY,\n    checksum TEXT NOT NULL,\n    applied_at TEXT NOT NULL\n)"
            ),
            Dialect::Postgres => format!(
                "CREATE TABLE IF NOT EXISTS {table} (\n    filename TEXT PRIMARY KEY,\n    checksum TEXT NOT NULL,\n    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()\n)"
            ),
            Dialect::Mysql => format!(
                "CREATE TABLE IF NOT EXISTS {table} (\n    filename VARCHAR(255) PRIMARY KEY,\n    checksum VARCHAR(64) NOT NULL,\n    applied_at DATETIME(6) NOT NULL\n)"
            ),
            Dialect::Sqlserver => format!(
                "IF OBJECT_ID(N'{}', N'U') IS NULL\nCREATE TABLE {table} (\n    filename NVARCHAR(255) NOT NULL PRIMARY KEY,\n    checksum NVARCHAR(64) NOT NULL,\n    applied_at DATETIMEOFFSET NOT NULL\n)",
                self.table.replace('\'', "''")
            ),
        }
    }

    pub fn select_all(&self) -> String {
        format!(
            "SELECT filename, checksum, applied_at FROM {} ORDER BY filename",
            self.quoted()
        )
    }

    /// Insert a record, replacing the checksum and timestamp of an existing
    /// row for the same filename.
    pub fn upsert(&self) -> String {
        let table = self.quoted();
        match self.dialect {
            Dialect::Sqlite => format!(
                "INSERT INTO {table} (filename, checksum, applied_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT (filename) DO UPDATE SET checksum = excluded.checksum, applied_at = excluded.applied_at"
            ),
            Dialect::Postgres => format!(
                "INSERT INTO {table} (filename, checksum, applied_at) VALUES ($1, $2, $3) \
                 ON CONFLICT (filename) DO UPDATE SET checksum = EXCLUDED.checksum, applied_at = EXCLUDED.applied_at"
            ),
            Dialect::Mysql => format!(
                "INSERT INTO {table} (filename, checksum, applied_at) VALUES (?, ?, ?) \
                 ON DUPLICATE KEY UPDATE checksum = VALUES(checksum), applied_at = VALUES(applied_at)"
            ),
            Dialect::Sqlserver => format!(
                "MERGE {table} AS target \
                 USING (SELECT @P1 AS filename, @P2 AS checksum, @P3 AS applied_at) AS source \
                 ON target.filename = source.filename \
                 WHEN MATCHED THEN UPDATE SET checksum = source.checksum, applied_at = source.applied_at \
                 WHEN NOT MATCHED THEN INSERT (filename, checksum, applied_at) \
                 VALUES (source.filename, source.checksum, source.applied_at);"
            ),
        }
    }

    /// Table backing the lock, for dialects without advisory locks.
    pub fn create_lock_table(&self) -> Option<String> {
        match self.dialect {
            Dialect::Sqlite => Some(format!(
                "CREATE TABLE IF NOT EXISTS {} (\n    id INTEGER PRIMARY KEY CHECK (id = 1),\n    locked_at TEXT NOT NULL\n)",
                self.dialect.quote_identifier(&lock_table_name(&self.table))
            )),
            _ => None,
        }
    }

    /// A statement that takes the lock without waiting.
    ///
    /// On postgres and mysql it selects a boolean-like result; on sqlserver
    /// it selects the `sp_getapplock` status (>= 0 when granted); on sqlite
    /// it inserts the single lock row and succeeds when one row changed.
    pub fn try_lock(&self) -> String {
        match self.dialect {
            Dialect::Sqlite => format!(
                "INSERT OR IGNORE INTO {} (id, locked_at) VALUES (1, ?1)",
                self.dialect.quote_identifier(&lock_table_name(&self.table))
            ),
            Dialect::Postgres => format!("SELECT pg_try_advisory_lock({})", self.lock_key()),
            Dialect::Mysql => format!("SELECT GET_LOCK({}, 0)", self.lock_name()),
            Dialect::Sqlserver => format!(
                "DECLARE @result INT; \
                 EXEC @result = sp_getapplock @Resource = {}, @LockMode = 'Exclusive', @LockOwner = 'Session', @LockTimeout = 0; \
                 SELECT @result",
                self.lock_name()
            ),
        }
    }

    /// Remove a lock row taken before the cutoff passed as `?1`. Only the
    /// lock table needs this: the other dialects use session locks.
    pub fn clear_stale_lock(&self) -> Option<String> {
        match self.dialect {
            Dialect::Sqlite => Some(format!(
                "DELETE FROM {} WHERE id = 1 AND locked_at < ?1",
                self.dialect.quote_identifier(&lock_table_name(&self.table))
            )),
            _ => None,
        }
    }

    /// Stamp the held lock with the time passed as `?1`.
    pub fn refresh_lock(&self) -> Option<String> {
        match self.dialect {
            Dialect::Sqlite => Some(format!(
                "UPDATE {} SET locked_at = ?1 WHERE id = 1",
                self.dialect.quote_identifier(&lock_table_name(&self.table))
            )),
            _ => None,
        }
    }

    pub fn unlock(&self) -> String {
        match self.dialect {
            Dialect::Sqlite => format!(
                "DELETE FROM {} WHERE id = 1",
                self.dialect.quote_identifier(&lock_table_name(&self.table))
            ),
            Dialect::Postgres => format!("SELECT pg_advisory_unlock({})", self.lock_key()),
            Dialect::Mysql => format!("SELECT RELEASE_LOCK({})", self.lock_name()),
            Dialect::Sqlserver => format!(
                "EXEC sp_releaseapplock @Resource = {}, @LockOwner = 'Session'",
                self.lock_name()
            ),
        }
    }

    /// Advisory lock key: the first eight bytes of the table name's SHA-256.
    pub fn lock_key(&self) -> i64 {
        let digest = Sha256::digest(self.table.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        i64::from_be_bytes(bytes)
    }

    fn lock_name(&self) -> String {
        let name = self.dialect.quote_string(&lock_table_name(&self.table));
        match self.dialect {
            Dialect::Sqlserver => format!("N{name}"),
            _ => name,
        }
    }
}
