//! Migration runs against real SQLite databases.

use std::path::Path;
use std::time::Duration;

use pretty_assertions::assert_eq;
use strata_catalog::Dialect;
use strata_migrate::{
    FileState, GenerateConfig, MigrationDatabase, MigrationError, MigrationRunner,
    MigrationSource, RunnerConfig, diff_catalogs, generate, load_catalog,
};
use strata_sqlite::{SqliteConfig, SqliteDatabase};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const HISTORY: &str = "strata_history";

fn write(dir: &Path, name: &str, contents: &str) {
    let path = dir.join(name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

async fn runner(path: &Path) -> MigrationRunner<SqliteDatabase> {
    let db = SqliteDatabase::open(SqliteConfig::file(path)).await.unwrap();
    MigrationRunner::new(db, RunnerConfig::new())
}

fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    let migrations = dir.path().join("migrations");
    write(
        &migrations,
        "0001_film.sql",
        "CREATE TABLE film (\n    film_id INTEGER PRIMARY KEY,\n    title TEXT NOT NULL\n);\n",
    );
    write(
        &migrations,
        "0002_rating.sql",
        "ALTER TABLE film ADD COLUMN rating TEXT;\n",
    );
    write(
        &migrations,
        "repeatable/views/film_list.sql",
        "DROP VIEW IF EXISTS film_list;\nCREATE VIEW film_list AS SELECT film_id, title FROM film;\n",
    );
    dir
}

#[tokio::test]
async fn test_migrate_twice_is_a_no_op() {
    let dir = fixture();
    let migrations = dir.path().join("migrations");
    let db_path = dir.path().join("app.db");
    let cancel = CancellationToken::new();

    let source = MigrationSource::load(&migrations).await.unwrap();
    let first = runner(&db_path).await.migrate(&source, &cancel).await.unwrap();
    assert_eq!(
        first.applied,
        vec!["0001_film.sql", "0002_rating.sql", "repeatable/views/film_list.sql"]
    );

    let runner = runner(&db_path).await;
    let history = runner.database().load_history(HISTORY).await.unwrap();
    let second = runner.migrate(&source, &cancel).await.unwrap();
    assert!(!second.has_changes());
    assert_eq!(runner.database().load_history(HISTORY).await.unwrap(), history);
}

#[tokio::test]
async fn test_changed_view_is_reapplied_and_drift_is_caught() {
    let dir = fixture();
    let migrations = dir.path().join("migrations");
    let db_path = dir.path().join("app.db");
    let cancel = CancellationToken::new();
    let runner = runner(&db_path).await;

    runner
        .migrate(&MigrationSource::load(&migrations).await.unwrap(), &cancel)
        .await
        .unwrap();

    write(
        &migrations,
        "repeatable/views/film_list.sql",
        "DROP VIEW IF EXISTS film_list;\nCREATE VIEW film_list AS SELECT film_id, title, rating FROM film;\n",
    );
    let source = MigrationSource::load(&migrations).await.unwrap();
    let statuses = runner.ls(&source).await.unwrap();
    assert_eq!(statuses[2].state, FileState::Changed);
    let report = runner.migrate(&source, &cancel).await.unwrap();
    assert_eq!(report.reapplied, vec!["repeatable/views/film_list.sql"]);

    write(&migrations, "0001_film.sql", "CREATE TABLE film (film_id INTEGER PRIMARY KEY);\n");
    write(&migrations, "0003_actor.sql", "CREATE TABLE actor (actor_id INTEGER PRIMARY KEY);\n");
    let source = MigrationSource::load(&migrations).await.unwrap();
    let err = runner.migrate(&source, &cancel).await.unwrap_err();
    assert!(matches!(err, MigrationError::Drift { ref file, .. } if file == "0001_film.sql"));
    assert!(!runner.database().table_names().await.unwrap().contains(&"actor".to_string()));
}

#[tokio::test]
async fn test_failed_file_leaves_history_at_last_success() {
    let dir = fixture();
    let migrations = dir.path().join("migrations");
    write(&migrations, "0003_broken.sql", "CREATE TABLE actor (id INTEGER);\nCREATE TABLE film (id INTEGER);\n");
    let runner = runner(&dir.path().join("app.db")).await;

    let source = MigrationSource::load(&migrations).await.unwrap();
    let err = runner.migrate(&source, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, MigrationError::Execution { ref file, .. } if file == "0003_broken.sql"));

    let recorded: Vec<String> = runner
        .database()
        .load_history(HISTORY)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.filename)
        .collect();
    assert_eq!(recorded, vec!["0001_film.sql", "0002_rating.sql"]);
    assert!(!runner.database().table_names().await.unwrap().contains(&"actor".to_string()));
    // The lock was released on the way out.
    assert!(runner.database().try_acquire_lock(HISTORY).await.unwrap());
}

#[tokio::test]
async fn test_lock_left_by_dead_runner_expires() {
    let dir = fixture();
    let migrations = dir.path().join("migrations");
    let db_path = dir.path().join("app.db");
    let source = MigrationSource::load(&migrations).await.unwrap();

    {
        let crashed = SqliteDatabase::open(SqliteConfig::file(&db_path)).await.unwrap();
        crashed.ensure_history_table(HISTORY).await.unwrap();
        assert!(crashed.try_acquire_lock(HISTORY).await.unwrap());
    }

    // A recent lock still blocks other runners.
    let impatient = RunnerConfig::new()
        .lock_retries(1)
        .lock_retry_delay(Duration::from_millis(1));
    let db = SqliteDatabase::open(SqliteConfig::file(&db_path)).await.unwrap();
    let err = MigrationRunner::new(db, impatient.clone())
        .migrate(&source, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::LockFailed(_)), "{err:?}");

    let db = SqliteDatabase::open(SqliteConfig::file(&db_path)).await.unwrap();
    db.execute_batch("UPDATE strata_history_lock SET locked_at = '2000-01-01T00:00:00.000000Z'")
        .await
        .unwrap();
    let report = MigrationRunner::new(db, impatient)
        .migrate(&source, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.applied.len(), 3);
}

#[tokio::test]
async fn test_touch_adopts_existing_views() {
    let dir = fixture();
    let migrations = dir.path().join("migrations");
    let runner = runner(&dir.path().join("app.db")).await;
    let source = MigrationSource::load(&migrations).await.unwrap();

    let touched = runner
        .touch(&source, &["repeatable/views/film_list.sql".to_string()])
        .await
        .unwrap();
    assert_eq!(touched, vec!["repeatable/views/film_list.sql"]);
    // Recorded without running: the view's table does not exist.
    assert!(!runner.database().table_names().await.unwrap().contains(&"film".to_string()));

    let states: Vec<FileState> = runner.ls(&source).await.unwrap().into_iter().map(|s| s.state).collect();
    assert_eq!(states, vec![FileState::Pending, FileState::Pending, FileState::Applied]);
}

#[tokio::test]
async fn test_generated_migration_converges() {
    let dir = fixture();
    let migrations = dir.path().join("migrations");
    let dest = dir.path().join("schema.ddl");
    std::fs::write(
        &dest,
        "table film {\n    film_id  number  type=INTEGER primarykey\n    title    string  notnull\n    rating   string\n    length   number\n}\n\n\
         table actor {\n    actor_id  number  primarykey\n    film_id   number  references=film.film_id\n}\n\n\
         view film_list `SELECT film_id, title FROM film`\n",
    )
    .unwrap();
    let dest = dest.to_str().unwrap().to_string();
    let migrations_str = migrations.to_str().unwrap().to_string();

    let outcome = generate(
        &GenerateConfig::new(&migrations_str, &dest, Dialect::Sqlite)
            .output_dir(&migrations)
            .prefix("0003_actor"),
    )
    .await
    .unwrap();
    assert_eq!(outcome.files.len(), 1);

    let runner = runner(&dir.path().join("app.db")).await;
    let source = MigrationSource::load(&migrations).await.unwrap();
    let report = runner.migrate(&source, &CancellationToken::new()).await.unwrap();
    assert_eq!(report.applied.len(), 4);
    let tables = runner.database().table_names().await.unwrap();
    assert!(tables.contains(&"actor".to_string()));

    let replayed = load_catalog(&migrations_str, Dialect::Sqlite, HISTORY).await.unwrap();
    let wanted = load_catalog(&dest, Dialect::Sqlite, HISTORY).await.unwrap();
    let remaining = diff_catalogs(Dialect::Sqlite, &replayed, &wanted).unwrap();
    assert!(remaining.is_empty(), "{remaining:?}");
}
