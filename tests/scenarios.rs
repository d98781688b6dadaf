//! End-to-end flows through the `strata` facade.

use std::path::Path;

use pretty_assertions::assert_eq;
use strata::catalog::parse_declarative;
use strata::migrate::{GenerateConfig, diff_catalogs, generate, replay_directory};
use strata::{Catalog, Dialect, diff};
use tempfile::TempDir;

const MOVIES: &str = "
table category {
    category_id  number  primarykey identity
    category     string  unique
}

table movie {
    movie_id     number  primarykey identity
    title        string  unique
    category     string  references={category.category index}
    subcategory  string  references={category.category index}
    metadata     json
}
";

const FILMS_V1: &str = "table film {\n    film_id number primarykey\n    title string\n    rating string\n}\n";

const FILMS_V2: &str = "table language {\n    language_id number primarykey\n    name string notnull unique\n}\n\n\
                        table film {\n    film_id number primarykey\n    title string notnull index\n    \
                        language_id number references={language.language_id}\n}\n";

fn position(statements: &[&str], needle: &str) -> usize {
    statements
        .iter()
        .position(|s| s.contains(needle))
        .unwrap_or_else(|| panic!("no statement contains {needle:?} in {statements:#?}"))
}

fn path(dir: &Path, name: &str) -> String {
    dir.join(name).to_string_lossy().into_owned()
}

#[test]
fn test_movies_are_created_in_dependency_order() {
    for dialect in Dialect::ALL {
        let wanted = parse_declarative(dialect, MOVIES).unwrap();
        let output = diff(dialect, &Catalog::new(dialect), &wanted, false).unwrap();
        let statements: Vec<&str> = output.statements().collect();

        let category = position(&statements, "CREATE TABLE category");
        let movie = position(&statements, "CREATE TABLE movie");
        let category_idx = position(&statements, "INDEX movie_category_idx");
        let subcategory_idx = position(&statements, "INDEX movie_subcategory_idx");
        assert!(category < movie, "{dialect}: {statements:#?}");
        assert!(movie < category_idx, "{dialect}: {statements:#?}");
        assert!(category_idx < subcategory_idx, "{dialect}: {statements:#?}");
    }
}

#[test]
fn test_diff_against_itself_is_empty() {
    for dialect in Dialect::ALL {
        let catalog = parse_declarative(dialect, MOVIES).unwrap();
        let output = diff(dialect, &catalog, &catalog.clone(), true).unwrap();
        assert!(output.is_empty(), "{dialect}: {output:?}");
        assert!(output.warnings.is_empty());
    }
}

#[test]
fn test_drops_are_gated_behind_a_flag() {
    let dialect = Dialect::Postgres;
    let with_actor = format!("{MOVIES}\ntable actor {{\n    actor_id number primarykey\n}}\n");
    let current = parse_declarative(dialect, &with_actor).unwrap();
    let wanted = parse_declarative(dialect, MOVIES).unwrap();

    let gated = diff(dialect, &current, &wanted, false).unwrap();
    assert_eq!(gated.statements().count(), 0);
    assert_eq!(gated.warnings.len(), 1);
    assert!(gated.warnings[0].contains("DROP TABLE actor skipped"));

    let allowed = diff(dialect, &current, &wanted, true).unwrap();
    let statements: Vec<&str> = allowed.statements().collect();
    assert_eq!(statements, vec!["DROP TABLE actor"]);
    assert!(allowed.warnings.is_empty());
}

#[test]
fn test_only_current_schema_differs() {
    let dialect = Dialect::Postgres;
    let wanted = parse_declarative(dialect, MOVIES).unwrap();

    let mut qualified = wanted.clone().with_current_schema("public");
    for schema in &mut qualified.schemas {
        schema.schema_name = "public".to_string();
        for table in &mut schema.tables {
            table.table_schema = "public".to_string();
        }
    }

    assert!(diff_catalogs(dialect, &qualified, &wanted).unwrap().is_empty());
    assert!(diff(dialect, &qualified, &wanted, true).unwrap().is_empty());
}

#[tokio::test]
async fn test_generated_directory_replays_to_destination() {
    for dialect in Dialect::ALL {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("v1.ddl"), FILMS_V1).unwrap();
        std::fs::write(dir.path().join("v2.ddl"), FILMS_V2).unwrap();
        let migrations = dir.path().join("migrations");

        let first = GenerateConfig::new("", path(dir.path(), "v1.ddl"), dialect)
            .output_dir(&migrations)
            .prefix("0001_films");
        let outcome = generate(&first).await.unwrap();
        assert!(outcome.written, "{dialect}");
        assert!(!outcome.is_empty());

        let second = GenerateConfig::new(
            migrations.to_string_lossy(),
            path(dir.path(), "v2.ddl"),
            dialect,
        )
        .output_dir(&migrations)
        .prefix("0002_languages")
        .drop_objects(true)
        .accept_warnings(true);
        let outcome = generate(&second).await.unwrap();
        assert!(!outcome.is_empty(), "{dialect}");

        let replayed = replay_directory(dialect, &migrations, "strata_history").await.unwrap();
        let wanted = parse_declarative(dialect, FILMS_V2).unwrap();
        let remaining = diff_catalogs(dialect, &replayed, &wanted).unwrap();
        assert!(remaining.is_empty(), "{dialect}: {remaining:?}");

        // Once converged, generating again writes nothing.
        let third = GenerateConfig::new(
            migrations.to_string_lossy(),
            path(dir.path(), "v2.ddl"),
            dialect,
        )
        .output_dir(&migrations)
        .prefix("0003_nothing");
        let outcome = generate(&third).await.unwrap();
        assert!(outcome.is_empty(), "{dialect}: {:?}", outcome.files);
        assert!(!migrations.join("0003_nothing.sql").exists());
    }
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use pretty_assertions::assert_eq;

    use super::*;
    use strata::migrate::{FileState, MigrationRunner, MigrationSource, RunnerConfig};
    use strata::sqlite::{SqliteConfig, SqliteDatabase};
    use tokio_util::sync::CancellationToken;

    fn write(dir: &Path, name: &str, contents: &str) {
        let path = dir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn test_touch_views_then_migrate() {
        let dir = TempDir::new().unwrap();
        let migrations = dir.path().join("migrations");
        write(&migrations, "0001_film.sql", "CREATE TABLE film (film_id INTEGER PRIMARY KEY, title TEXT);\n");
        write(
            &migrations,
            "repeatable/views/film_titles.sql",
            "CREATE VIEW film_titles AS SELECT title FROM film;\n",
        );
        write(
            &migrations,
            "repeatable/views/film_ids.sql",
            "CREATE VIEW film_ids AS SELECT film_id FROM film;\n",
        );

        let db = SqliteDatabase::open(SqliteConfig::file(dir.path().join("app.db")))
            .await
            .unwrap();
        db.execute_batch(
            "CREATE TABLE film (film_id INTEGER PRIMARY KEY, title TEXT);\n\
             CREATE VIEW film_titles AS SELECT title FROM film;\n\
             CREATE VIEW film_ids AS SELECT film_id FROM film;",
        )
        .await
        .unwrap();
        let runner = MigrationRunner::new(db, RunnerConfig::new());
        let source = MigrationSource::load(&migrations).await.unwrap();

        let touched = runner
            .touch(
                &source,
                &[
                    "0001_film.sql".to_string(),
                    "repeatable/views/film_titles.sql".to_string(),
                    "repeatable/views/film_ids.sql".to_string(),
                ],
            )
            .await
            .unwrap();
        assert_eq!(
            touched,
            vec![
                "0001_film.sql",
                "repeatable/views/film_ids.sql",
                "repeatable/views/film_titles.sql",
            ]
        );

        // Nothing runs: every file is already recorded with its checksum.
        let cancel = CancellationToken::new();
        let report = runner.migrate(&source, &cancel).await.unwrap();
        assert!(!report.has_changes(), "{report:?}");

        let statuses = runner.ls(&source).await.unwrap();
        assert!(statuses.iter().all(|s| s.state == FileState::Applied), "{statuses:?}");
    }
}
