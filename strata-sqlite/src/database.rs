//! The SQLite migration database.

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use rusqlite::{OptionalExtension, params};
use strata_catalog::Dialect;
use strata_migrate::history::{HistorySql, format_timestamp, parse_timestamp};
use strata_migrate::{ApplyUnit, HistoryRecord, MigrateResult, MigrationDatabase, MigrationError};
use tokio_rusqlite::Connection;
use tracing::{debug, trace, warn};

use crate::config::SqliteConfig;
use crate::error::{from_driver, from_rusqlite};

/// A single `tokio-rusqlite` connection used for migrations.
pub struct SqliteDatabase {
    conn: Connection,
    config: SqliteConfig,
}

impl SqliteDatabase {
    /// Open the database and apply the configured pragmas.
    pub async fn open(config: SqliteConfig) -> MigrateResult<Self> {
        let conn = match &config.path {
            crate::DatabasePath::Memory => Connection::open_in_memory().await,
            crate::DatabasePath::File(path) => Connection::open(path).await,
        }
        .map_err(from_driver)?;

        let init_sql = config.init_sql();
        conn.call(move |conn| Ok(conn.execute_batch(&init_sql)?))
            .await
            .map_err(from_driver)?;
        debug!(path = ?config.path, "opened sqlite database");
        Ok(Self { conn, config })
    }

    /// Open the database a DSN names.
    pub async fn connect(dsn: &str) -> MigrateResult<Self> {
        Self::open(SqliteConfig::from_dsn(dsn)?).await
    }

    /// A private in-memory database.
    pub async fn memory() -> MigrateResult<Self> {
        Self::open(SqliteConfig::memory()).await
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Run a script outside of migration tracking.
    pub async fn execute_batch(&self, sql: &str) -> MigrateResult<()> {
        let sql = sql.to_string();
        trace!(sql = %sql, "executing batch");
        self.conn
            .call(move |conn| Ok(conn.execute_batch(&sql)?))
            .await
            .map_err(from_driver)
    }

    /// Names of user tables, sorted.
    pub async fn table_names(&self) -> MigrateResult<Vec<String>> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master \
                     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                )?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(from_driver)
    }

    async fn table_exists(&self, table: &str) -> MigrateResult<bool> {
        let table = table.to_string();
        self.conn
            .call(move |conn| {
                let found = conn
                    .query_row(
                        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                        [&table],
                        |_| Ok(()),
                    )
                    .optional()?;
                Ok(found.is_some())
            })
            .await
            .map_err(from_driver)
    }
}

#[async_trait]
impl MigrationDatabase for SqliteDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn ensure_history_table(&self, history_table: &str) -> MigrateResult<()> {
        let history = HistorySql::new(Dialect::Sqlite, history_table);
        let mut sql = history.create_table();
        if let Some(lock) = history.create_lock_table() {
            sql.push_str(";\n");
            sql.push_str(&lock);
        }
        self.execute_batch(&sql).await
    }

    async fn load_history(&self, history_table: &str) -> MigrateResult<Vec<HistoryRecord>> {
        if !self.table_exists(history_table).await? {
            return Ok(Vec::new());
        }
        let select = HistorySql::new(Dialect::Sqlite, history_table).select_all();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&select)?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(from_driver)?;

        rows.into_iter()
            .map(|(filename, checksum, applied_at)| {
                let applied_at = parse_timestamp(&applied_at).ok_or_else(|| {
                    MigrationError::database(format!(
                        "history row {filename} has an unreadable applied_at value {applied_at}"
                    ))
                })?;
                Ok(HistoryRecord {
                    filename,
                    checksum,
                    applied_at,
                })
            })
            .collect()
    }

    async fn try_acquire_lock(&self, history_table: &str) -> MigrateResult<bool> {
        let history = HistorySql::new(Dialect::Sqlite, history_table);
        let sql = history.try_lock();
        let now = Utc::now();
        // A runner that died while holding the lock leaves its row behind.
        let cutoff = self
            .config
            .stale_lock_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(TimeDelta::try_seconds)
            .and_then(|age| now.checked_sub_signed(age));
        let stale = history
            .clear_stale_lock()
            .zip(cutoff)
            .map(|(clear, cutoff)| (clear, format_timestamp(&cutoff)));
        let now = format_timestamp(&now);

        let (cleared, changed) = self
            .conn
            .call(move |conn| {
                let cleared = match &stale {
                    Some((clear, cutoff)) => conn.execute(clear, [cutoff])?,
                    None => 0,
                };
                let changed = conn.execute(&sql, [&now])?;
                Ok((cleared, changed))
            })
            .await
            .map_err(from_driver)?;
        if cleared > 0 {
            warn!(history_table, "cleared a stale migration lock");
        }
        Ok(changed == 1)
    }

    async fn release_lock(&self, history_table: &str) -> MigrateResult<()> {
        let sql = HistorySql::new(Dialect::Sqlite, history_table).unlock();
        self.conn
            .call(move |conn| Ok(conn.execute(&sql, [])?))
            .await
            .map_err(from_driver)?;
        Ok(())
    }

    async fn apply(&self, unit: ApplyUnit) -> MigrateResult<()> {
        let history = HistorySql::new(Dialect::Sqlite, &unit.history_table);
        let upsert = history.upsert();
        let refresh = history.refresh_lock().unwrap_or_default();
        let ApplyUnit {
            sql,
            record,
            transactional,
            ..
        } = unit;
        debug!(file = %record.filename, transactional, touch = sql.is_none(), "applying unit");
        let applied_at = format_timestamp(&record.applied_at);

        // Driver errors are carried out of the closure untouched so the
        // result code survives.
        let outcome = self
            .conn
            .call(move |conn| {
                let result = if transactional {
                    conn.transaction().and_then(|tx| {
                        if let Some(sql) = &sql {
                            tx.execute_batch(sql)?;
                        }
                        tx.execute(&upsert, params![record.filename, record.checksum, applied_at])?;
                        tx.execute(&refresh, [&applied_at])?;
                        tx.commit()
                    })
                } else {
                    sql.as_deref()
                        .map_or(Ok(()), |sql| conn.execute_batch(sql))
                        .and_then(|()| {
                            conn.execute(
                                &upsert,
                                params![record.filename, record.checksum, applied_at],
                            )
                        })
                        .and_then(|_| conn.execute(&refresh, [&applied_at]))
                        .map(|_| ())
                };
                Ok(result)
            })
            .await
            .map_err(from_driver)?;
        outcome.map_err(from_rusqlite)
    }
}
