//! Applying migration files to a database.
//!
//! Each file moves from pending to applied inside its own transaction
//! together with its history row. Repeatable files are applied again when
//! their checksum changes; a changed regular file is drift and stops the run
//! before anything executes.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use strata_catalog::Dialect;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::driver::DriverCapabilities;
use crate::error::{MigrateResult, MigrationError};
use crate::file::{MigrationFile, MigrationSource};
use crate::history::{DEFAULT_HISTORY_TABLE, HistoryRecord};

/// One unit of work for [`MigrationDatabase::apply`].
#[derive(Debug, Clone)]
pub struct ApplyUnit {
    /// Script to execute; `None` records history only.
    pub sql: Option<String>,
    pub record: HistoryRecord,
    pub history_table: String,
    /// Run the script and the history upsert in one transaction.
    pub transactional: bool,
}

/// A database the runner can migrate.
#[async_trait]
pub trait MigrationDatabase: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Create the history table (and lock table, where one is used).
    async fn ensure_history_table(&self, history_table: &str) -> MigrateResult<()>;

    /// All history rows ordered by filename. Empty when the history table
    /// does not exist yet.
    async fn load_history(&self, history_table: &str) -> MigrateResult<Vec<HistoryRecord>>;

    /// Take the migration lock without waiting. `Ok(false)` means another
    /// runner holds it.
    async fn try_acquire_lock(&self, history_table: &str) -> MigrateResult<bool>;

    async fn release_lock(&self, history_table: &str) -> MigrateResult<()>;

    /// Execute the unit's script and upsert its history row. When the unit
    /// is transactional both happen atomically or not at all.
    async fn apply(&self, unit: ApplyUnit) -> MigrateResult<()>;
}

/// Configuration for the runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub history_table: String,
    /// Lock attempts before giving up.
    pub lock_retries: u32,
    /// Base delay between lock attempts; attempt `n` waits `n` times this.
    pub lock_retry_delay: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            history_table: DEFAULT_HISTORY_TABLE.to_string(),
            lock_retries: 5,
            lock_retry_delay: Duration::from_millis(200),
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the history table name.
    pub fn history_table(mut self, table: impl Into<String>) -> Self {
        self.history_table = table.into();
        self
    }

    /// Set the number of lock attempts.
    pub fn lock_retries(mut self, retries: u32) -> Self {
        self.lock_retries = retries;
        self
    }

    /// Set the base delay between lock attempts.
    pub fn lock_retry_delay(mut self, delay: Duration) -> Self {
        self.lock_retry_delay = delay;
        self
    }
}

/// Status of one migration file relative to history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    Applied,
    Pending,
    /// Recorded in history but gone from disk.
    Missing,
    /// Repeatable file whose content changed since it was applied.
    Changed,
    /// Regular file whose content changed since it was applied.
    Drifted,
}

impl FileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Pending => "pending",
            Self::Missing => "missing",
            Self::Changed => "changed",
            Self::Drifted => "drifted",
        }
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of `ls` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStatus {
    pub filename: String,
    pub state: FileState,
    /// Checksum on disk, or the recorded one for missing files.
    pub checksum: Option<String>,
    pub applied_at: Option<DateTime<Utc>>,
}

/// Result of a migrate run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrateReport {
    /// Files applied for the first time.
    pub applied: Vec<String>,
    /// Repeatable files applied again after a change.
    pub reapplied: Vec<String>,
    /// Files already up to date.
    pub skipped: Vec<String>,
    pub duration_ms: i64,
}

impl MigrateReport {
    /// Check if any file was applied.
    pub fn has_changes(&self) -> bool {
        !self.applied.is_empty() || !self.reapplied.is_empty()
    }

    /// Get a summary of the result.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.applied.is_empty() {
            parts.push(format!("{} applied", self.applied.len()));
        }
        if !self.reapplied.is_empty() {
            parts.push(format!("{} reapplied", self.reapplied.len()));
        }
        if parts.is_empty() {
            "No migrations applied".to_string()
        } else {
            format!("{} in {}ms", parts.join(", "), self.duration_ms)
        }
    }
}

/// What to do with one file during a run.
enum Action {
    Apply,
    Reapply,
    Skip,
}

/// Applies a [`MigrationSource`] to a [`MigrationDatabase`].
pub struct MigrationRunner<D: MigrationDatabase> {
    db: D,
    config: RunnerConfig,
    capabilities: DriverCapabilities,
}

impl<D: MigrationDatabase> MigrationRunner<D> {
    /// Create a runner using the built-in driver rules for the database's
    /// dialect.
    pub fn new(db: D, config: RunnerConfig) -> Self {
        let capabilities = DriverCapabilities::for_dialect(db.dialect());
        Self {
            db,
            config,
            capabilities,
        }
    }

    /// Use explicit driver capabilities, e.g. from a registry.
    pub fn with_capabilities(mut self, capabilities: DriverCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn database(&self) -> &D {
        &self.db
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Apply every pending file, and every changed repeatable file, in order.
    ///
    /// Cancellation is checked between files; files already applied stay
    /// committed.
    pub async fn migrate(
        &self,
        source: &MigrationSource,
        cancel: &CancellationToken,
    ) -> MigrateResult<MigrateReport> {
        let start = Instant::now();
        self.db.ensure_history_table(&self.config.history_table).await?;
        let mut report = self
            .with_lock(self.migrate_locked(source, cancel))
            .await?;
        report.duration_ms = start.elapsed().as_millis() as i64;
        info!(
            applied = report.applied.len(),
            reapplied = report.reapplied.len(),
            skipped = report.skipped.len(),
            "migration run finished"
        );
        Ok(report)
    }

    async fn migrate_locked(
        &self,
        source: &MigrationSource,
        cancel: &CancellationToken,
    ) -> MigrateResult<MigrateReport> {
        let history = self.history_map().await?;
        check_drift(source, &history)?;

        let mut report = MigrateReport::default();
        for file in source.files() {
            let action = match history.get(&file.filename) {
                None => Action::Apply,
                Some(record) if file.repeatable && record.checksum != file.checksum => {
                    Action::Reapply
                }
                Some(_) => Action::Skip,
            };
            if matches!(action, Action::Skip) {
                debug!(file = %file.filename, "already applied");
                report.skipped.push(file.filename.clone());
                continue;
            }
            if cancel.is_cancelled() {
                warn!(file = %file.filename, "migration run cancelled");
                return Err(MigrationError::Cancelled);
            }
            self.apply_file(file).await?;
            match action {
                Action::Reapply => report.reapplied.push(file.filename.clone()),
                _ => report.applied.push(file.filename.clone()),
            }
        }
        Ok(report)
    }

    async fn apply_file(&self, file: &MigrationFile) -> MigrateResult<()> {
        let transactional = file.is_transactional(self.db.dialect());
        info!(file = %file.filename, transactional, "applying migration");
        let unit = ApplyUnit {
            sql: Some(file.contents.clone()),
            record: HistoryRecord::for_file(file),
            history_table: self.config.history_table.clone(),
            transactional,
        };
        self.db.apply(unit).await.map_err(|err| match err {
            MigrationError::Execution { .. } => err,
            other => MigrationError::Execution {
                file: file.filename.clone(),
                message: other.to_string(),
            },
        })
    }

    /// Record files as applied without running them. Names may be relative
    /// to the directory or include it. Returns the recorded filenames in
    /// sorted order.
    pub async fn touch(
        &self,
        source: &MigrationSource,
        names: &[String],
    ) -> MigrateResult<Vec<String>> {
        let mut files = Vec::new();
        for name in names {
            let file = source
                .resolve(name)
                .ok_or_else(|| MigrationError::NotFound(name.clone()))?;
            files.push(file);
        }
        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        files.dedup_by(|a, b| a.filename == b.filename);

        self.db.ensure_history_table(&self.config.history_table).await?;
        self.with_lock(async {
            let mut touched = Vec::new();
            for file in files {
                debug!(file = %file.filename, "touching migration");
                self.db
                    .apply(ApplyUnit {
                        sql: None,
                        record: HistoryRecord::for_file(file),
                        history_table: self.config.history_table.clone(),
                        transactional: true,
                    })
                    .await?;
                touched.push(file.filename.clone());
            }
            info!(files = touched.len(), "touched migrations");
            Ok(touched)
        })
        .await
    }

    /// Touch every file whose relative name matches `pattern`.
    pub async fn touch_glob(
        &self,
        source: &MigrationSource,
        pattern: &str,
    ) -> MigrateResult<Vec<String>> {
        let names: Vec<String> = source
            .matching(pattern)?
            .into_iter()
            .map(|f| f.filename.clone())
            .collect();
        if names.is_empty() {
            return Err(MigrationError::NotFound(pattern.to_string()));
        }
        self.touch(source, &names).await
    }

    /// Status of every file on disk followed by history rows without a file.
    pub async fn ls(&self, source: &MigrationSource) -> MigrateResult<Vec<FileStatus>> {
        let history = self.history_map().await?;
        let mut statuses: Vec<FileStatus> = source
            .files()
            .iter()
            .map(|file| {
                let record = history.get(&file.filename);
                let state = match record {
                    None => FileState::Pending,
                    Some(r) if r.checksum == file.checksum => FileState::Applied,
                    Some(_) if file.repeatable => FileState::Changed,
                    Some(_) => FileState::Drifted,
                };
                FileStatus {
                    filename: file.filename.clone(),
                    state,
                    checksum: Some(file.checksum.clone()),
                    applied_at: record.map(|r| r.applied_at),
                }
            })
            .collect();

        let mut missing: Vec<&HistoryRecord> = history
            .values()
            .filter(|r| source.get(&r.filename).is_none())
            .collect();
        missing.sort_by(|a, b| a.filename.cmp(&b.filename));
        statuses.extend(missing.into_iter().map(|r| FileStatus {
            filename: r.filename.clone(),
            state: FileState::Missing,
            checksum: Some(r.checksum.clone()),
            applied_at: Some(r.applied_at),
        }));
        Ok(statuses)
    }

    async fn history_map(&self) -> MigrateResult<HashMap<String, HistoryRecord>> {
        let records = self.db.load_history(&self.config.history_table).await?;
        Ok(records
            .into_iter()
            .map(|r| (r.filename.clone(), r))
            .collect())
    }

    /// Run `body` holding the migration lock, releasing it on every path.
    async fn with_lock<T>(
        &self,
        body: impl Future<Output = MigrateResult<T>>,
    ) -> MigrateResult<T> {
        self.acquire_lock().await?;
        let result = body.await;
        let released = self.db.release_lock(&self.config.history_table).await;
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(release_err)) => {
                warn!(error = %release_err, "failed to release migration lock");
                Err(err)
            }
        }
    }

    async fn acquire_lock(&self) -> MigrateResult<()> {
        let table = &self.config.history_table;
        let attempts = self.config.lock_retries.max(1);
        for attempt in 1..=attempts {
            match self.db.try_acquire_lock(table).await {
                Ok(true) => {
                    debug!(attempt, "acquired migration lock");
                    return Ok(());
                }
                Ok(false) => warn!(attempt, attempts, "migration lock is held by another runner"),
                Err(err)
                    if err
                        .database_info()
                        .is_some_and(|info| self.capabilities.is_lock_timeout(info)) =>
                {
                    warn!(attempt, attempts, error = %err, "migration lock timed out");
                }
                Err(err) => return Err(err),
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.lock_retry_delay * attempt).await;
            }
        }
        Err(MigrationError::lock_failed(format!(
            "lock for history table {table} still held after {attempts} attempts"
        )))
    }
}

/// Fail on the first regular file whose content changed since it was
/// applied.
fn check_drift(
    source: &MigrationSource,
    history: &HashMap<String, HistoryRecord>,
) -> MigrateResult<()> {
    for file in source.files().iter().filter(|f| !f.repeatable) {
        if let Some(record) = history.get(&file.filename) {
            if record.checksum != file.checksum {
                return Err(MigrationError::Drift {
                    file: file.filename.clone(),
                    expected: record.checksum.clone(),
                    actual: file.checksum.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::DatabaseErrorInfo;

    /// In-memory database recording what ran.
    #[derive(Default)]
    struct FakeDb {
        history: Mutex<Vec<HistoryRecord>>,
        executed: Mutex<Vec<String>>,
        transactional: Mutex<Vec<bool>>,
        locked: Mutex<bool>,
        /// Lock attempts answered with "held" before granting.
        busy_attempts: AtomicU32,
        /// Lock attempts answered with a driver error code.
        lock_error: Mutex<Option<DatabaseErrorInfo>>,
        fail_on: Mutex<Option<String>>,
        releases: AtomicU32,
    }

    #[async_trait]
    impl MigrationDatabase for Arc<FakeDb> {
        fn dialect(&self) -> Dialect {
            Dialect::Postgres
        }

        async fn ensure_history_table(&self, _history_table: &str) -> MigrateResult<()> {
            Ok(())
        }

        async fn load_history(&self, _history_table: &str) -> MigrateResult<Vec<HistoryRecord>> {
            Ok(self.history.lock().clone())
        }

        async fn try_acquire_lock(&self, _history_table: &str) -> MigrateResult<bool> {
            if let Some(info) = self.lock_error.lock().clone() {
                return Err(MigrationError::Database(info));
            }
            if self.busy_attempts.load(Ordering::SeqCst) > 0 {
                self.busy_attempts.fetch_sub(1, Ordering::SeqCst);
                return Ok(false);
            }
            let mut locked = self.locked.lock();
            if *locked {
                return Ok(false);
            }
            *locked = true;
            Ok(true)
        }

        async fn release_lock(&self, _history_table: &str) -> MigrateResult<()> {
            *self.locked.lock() = false;
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn apply(&self, unit: ApplyUnit) -> MigrateResult<()> {
            if let Some(sql) = &unit.sql {
                if self.fail_on.lock().as_deref() == Some(unit.record.filename.as_str()) {
                    return Err(MigrationError::database("syntax error"));
                }
                self.executed.lock().push(sql.clone());
                self.transactional.lock().push(unit.transactional);
            }
            let mut history = self.history.lock();
            history.retain(|r| r.filename != unit.record.filename);
            history.push(unit.record);
            history.sort_by(|a, b| a.filename.cmp(&b.filename));
            Ok(())
        }
    }

    fn source(files: &[(&str, &str)]) -> MigrationSource {
        MigrationSource::from_files(
            "migrations",
            files
                .iter()
                .map(|(name, sql)| MigrationFile::new(*name, *sql))
                .collect(),
        )
    }

    fn runner(db: &Arc<FakeDb>) -> MigrationRunner<Arc<FakeDb>> {
        MigrationRunner::new(
            db.clone(),
            RunnerConfig::new().lock_retry_delay(Duration::from_millis(10)),
        )
    }

    fn recorded(db: &FakeDb) -> Vec<String> {
        db.history.lock().iter().map(|r| r.filename.clone()).collect()
    }

    #[tokio::test]
    async fn test_migrate_applies_in_order_once() {
        let db = Arc::new(FakeDb::default());
        let files = source(&[
            ("10_c.sql", "CREATE TABLE c (id INT);"),
            ("2_b.sql", "CREATE TABLE b (id INT);"),
            ("repeatable/views/v.sql", "CREATE VIEW v AS SELECT 1;"),
        ]);
        let cancel = CancellationToken::new();

        let report = runner(&db).migrate(&files, &cancel).await.unwrap();
        assert_eq!(report.applied, vec!["2_b.sql", "10_c.sql", "repeatable/views/v.sql"]);
        assert!(report.has_changes());
        assert_eq!(db.executed.lock().len(), 3);
        let history_before = db.history.lock().clone();

        let report = runner(&db).migrate(&files, &cancel).await.unwrap();
        assert!(!report.has_changes());
        assert_eq!(report.skipped.len(), 3);
        assert_eq!(db.executed.lock().len(), 3);
        assert_eq!(*db.history.lock(), history_before);
        assert_eq!(db.releases.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_changed_repeatable_is_reapplied() {
        let db = Arc::new(FakeDb::default());
        let cancel = CancellationToken::new();
        let v1 = source(&[("1_a.sql", "SELECT 1;"), ("repeatable/v.sql", "CREATE VIEW v AS SELECT 1;")]);
        runner(&db).migrate(&v1, &cancel).await.unwrap();

        let v2 = source(&[("1_a.sql", "SELECT 1;"), ("repeatable/v.sql", "CREATE VIEW v AS SELECT 2;")]);
        let report = runner(&db).migrate(&v2, &cancel).await.unwrap();
        assert_eq!(report.reapplied, vec!["repeatable/v.sql"]);
        assert!(report.applied.is_empty());
        assert_eq!(db.executed.lock().last().unwrap(), "CREATE VIEW v AS SELECT 2;");
    }

    #[tokio::test]
    async fn test_drift_halts_before_running() {
        let db = Arc::new(FakeDb::default());
        let cancel = CancellationToken::new();
        runner(&db)
            .migrate(&source(&[("1_a.sql", "SELECT 1;")]), &cancel)
            .await
            .unwrap();

        let changed = source(&[("1_a.sql", "SELECT 2;"), ("2_b.sql", "SELECT 3;")]);
        let err = runner(&db).migrate(&changed, &cancel).await.unwrap_err();
        assert!(matches!(&err, MigrationError::Drift { file, .. } if file == "1_a.sql"));
        assert_eq!(db.executed.lock().len(), 1);
        assert!(!*db.locked.lock());

        let statuses = runner(&db).ls(&changed).await.unwrap();
        assert_eq!(statuses[0].state, FileState::Drifted);
        assert_eq!(statuses[1].state, FileState::Pending);
    }

    #[tokio::test]
    async fn test_execution_failure_keeps_earlier_files() {
        let db = Arc::new(FakeDb::default());
        *db.fail_on.lock() = Some("2_b.sql".to_string());
        let files = source(&[("1_a.sql", "SELECT 1;"), ("2_b.sql", "BROKEN;"), ("3_c.sql", "SELECT 3;")]);

        let err = runner(&db)
            .migrate(&files, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            MigrationError::Execution { file, message } => {
                assert_eq!(file, "2_b.sql");
                assert!(message.contains("syntax error"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(recorded(&db), vec!["1_a.sql"]);
        assert!(!*db.locked.lock());
    }

    #[tokio::test]
    async fn test_cancellation_between_files() {
        let db = Arc::new(FakeDb::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = runner(&db)
            .migrate(&source(&[("1_a.sql", "SELECT 1;")]), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::Cancelled));
        assert!(db.executed.lock().is_empty());
        assert!(!*db.locked.lock());
    }

    #[tokio::test]
    async fn test_touch_records_without_running() {
        let db = Arc::new(FakeDb::default());
        let files = source(&[
            ("1_schema.sql", "CREATE TABLE film (id INT);"),
            ("repeatable/views/film_list.sql", "CREATE VIEW film_list AS SELECT 1;"),
            ("repeatable/views/customer_list.sql", "CREATE VIEW customer_list AS SELECT 1;"),
        ]);
        let names = vec![
            "repeatable/views/film_list.sql".to_string(),
            "migrations/repeatable/views/customer_list.sql".to_string(),
        ];
        let touched = runner(&db).touch(&files, &names).await.unwrap();
        assert_eq!(
            touched,
            vec!["repeatable/views/customer_list.sql", "repeatable/views/film_list.sql"]
        );
        assert_eq!(recorded(&db), touched);
        assert!(db.executed.lock().is_empty());

        let err = runner(&db)
            .touch(&files, &["nope.sql".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::NotFound(name) if name == "nope.sql"));
    }

    #[tokio::test]
    async fn test_touch_glob() {
        let db = Arc::new(FakeDb::default());
        let files = source(&[("1_a.sql", "SELECT 1;"), ("repeatable/views/v.sql", "SELECT 2;")]);
        let touched = runner(&db).touch_glob(&files, "repeatable/**").await.unwrap();
        assert_eq!(touched, vec!["repeatable/views/v.sql"]);
        assert!(runner(&db).touch_glob(&files, "*.txt").await.is_err());
    }

    #[tokio::test]
    async fn test_ls_states() {
        let db = Arc::new(FakeDb::default());
        db.history.lock().extend([
            HistoryRecord::new("1_a.sql", MigrationFile::new("1_a.sql", "SELECT 1;").checksum),
            HistoryRecord::new("0_gone.sql", "abc"),
            HistoryRecord::new("repeatable/v.sql", "old"),
        ]);
        let files = source(&[
            ("1_a.sql", "SELECT 1;"),
            ("2_b.sql", "SELECT 2;"),
            ("repeatable/v.sql", "SELECT 3;"),
        ]);
        let statuses = runner(&db).ls(&files).await.unwrap();
        let states: Vec<_> = statuses
            .iter()
            .map(|s| (s.filename.as_str(), s.state))
            .collect();
        assert_eq!(
            states,
            vec![
                ("1_a.sql", FileState::Applied),
                ("2_b.sql", FileState::Pending),
                ("repeatable/v.sql", FileState::Changed),
                ("0_gone.sql", FileState::Missing),
            ]
        );
        assert!(statuses[1].applied_at.is_none());
        assert_eq!(statuses[3].checksum.as_deref(), Some("abc"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_retries_then_succeeds() {
        let db = Arc::new(FakeDb::default());
        db.busy_attempts.store(2, Ordering::SeqCst);
        let report = runner(&db)
            .migrate(&source(&[("1_a.sql", "SELECT 1;")]), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.applied.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_gives_up() {
        let db = Arc::new(FakeDb::default());
        db.busy_attempts.store(10, Ordering::SeqCst);
        let runner = MigrationRunner::new(db.clone(), RunnerConfig::new().lock_retries(3));
        let err = runner
            .migrate(&source(&[("1_a.sql", "SELECT 1;")]), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::LockFailed(_)));
        assert_eq!(db.busy_attempts.load(Ordering::SeqCst), 7);
        assert!(db.executed.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_errors_are_classified() {
        let db = Arc::new(FakeDb::default());
        *db.lock_error.lock() = Some(DatabaseErrorInfo::new(Some("55P03".into()), "lock timeout"));
        let err = runner(&db)
            .migrate(&source(&[]), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::LockFailed(_)));

        *db.lock_error.lock() = Some(DatabaseErrorInfo::new(Some("28P01".into()), "bad password"));
        let err = runner(&db)
            .migrate(&source(&[]), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::Database(_)));
    }

    #[tokio::test]
    async fn test_non_transactional_files_are_flagged() {
        let db = Arc::new(FakeDb::default());
        let files = source(&[
            ("1_a.sql", "CREATE TABLE a (id INT);"),
            ("2_b.sql", "CREATE INDEX CONCURRENTLY a_id_idx ON a (id);"),
        ]);
        runner(&db).migrate(&files, &CancellationToken::new()).await.unwrap();
        assert_eq!(*db.transactional.lock(), vec![true, false]);
    }
}
