//! Catalog replay.
//!
//! Replaying applies the DDL of already-written migration files, in the
//! order the runner would apply them, to an initially empty [`Catalog`].
//! The result is the structure a database would have after running those
//! files, computed without a connection.
//!
//! ```rust,ignore
//! use strata_migrate::replay::replay_sql;
//!
//! let catalog = replay_sql(Dialect::Postgres, "0001.sql", "CREATE TABLE film (id INT)")?;
//! assert!(catalog.table("", "film").is_some());
//! ```

mod cursor;
mod ddl;
pub mod lexer;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use strata_catalog::{Catalog, Dialect};
use tracing::{debug, info};

use crate::error::{MigrateResult, MigrationError};
use crate::file::MigrationSource;
use crate::history::lock_table_name;

pub use lexer::split_statements;

/// Incrementally applies DDL to a catalog.
#[derive(Debug, Clone)]
pub struct Replayer {
    dialect: Dialect,
    catalog: Catalog,
    /// SQL Server default constraint names, keyed by folded
    /// `schema.table.constraint`, mapped to their column.
    default_constraints: HashMap<String, String>,
    /// Folded names of enum types created so far.
    enum_types: HashSet<String>,
}

impl Replayer {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            catalog: Catalog::new(dialect).with_current_schema(dialect.default_schema()),
            default_constraints: HashMap::new(),
            enum_types: HashSet::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Apply every statement of one file. Errors name `file`.
    pub fn apply_sql(&mut self, file: &str, sql: &str) -> MigrateResult<()> {
        let statements = split_statements(sql);
        debug!(file, statements = statements.len(), "replaying file");
        for statement in &statements {
            self.apply_statement(statement)
                .map_err(|message| MigrationError::replay(file, message))?;
        }
        Ok(())
    }

    /// The catalog built so far.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Drop tables the migration machinery owns, such as the history table.
    pub fn exclude_tables(&mut self, names: &[String]) {
        let dialect = self.dialect;
        for schema in &mut self.catalog.schemas {
            schema
                .tables
                .retain(|t| !names.iter().any(|n| dialect.names_equal(n, &t.table_name)));
        }
    }

    pub fn finish(self) -> Catalog {
        self.catalog
    }
}

/// Replay one script into a fresh catalog.
pub fn replay_sql(dialect: Dialect, file: &str, sql: &str) -> MigrateResult<Catalog> {
    let mut replayer = Replayer::new(dialect);
    replayer.apply_sql(file, sql)?;
    Ok(replayer.finish())
}

/// Replay a migration directory in runner order, leaving out the history
/// table and its lock table.
pub async fn replay_directory(
    dialect: Dialect,
    dir: impl AsRef<Path>,
    history_table: &str,
) -> MigrateResult<Catalog> {
    let source = MigrationSource::load(dir.as_ref()).await?;
    replay_source(dialect, &source, history_table)
}

/// Replay already-loaded migration files in order.
pub fn replay_source(
    dialect: Dialect,
    source: &MigrationSource,
    history_table: &str,
) -> MigrateResult<Catalog> {
    let mut replayer = Replayer::new(dialect);
    for file in source.files() {
        replayer.apply_sql(&file.filename, &file.contents)?;
    }
    replayer.exclude_tables(&[history_table.to_string(), lock_table_name(history_table)]);
    let catalog = replayer.finish();
    info!(
        dir = %source.dir().display(),
        files = source.files().len(),
        tables = catalog.tables().count(),
        "replayed migrations"
    );
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use strata_catalog::{ConstraintType, Identity, ReferentialAction, parse_declarative};

    use super::*;
    use crate::diff::diff_catalogs;
    use crate::dialect::engine;
    use crate::file::MigrationFile;

    fn replay(dialect: Dialect, sql: &str) -> Catalog {
        replay_sql(dialect, "test.sql", sql).unwrap()
    }

    fn replay_err(dialect: Dialect, sql: &str) -> String {
        replay_sql(dialect, "0002_bad.sql", sql).unwrap_err().to_string()
    }

    #[test]
    fn test_create_table_with_constraints() {
        let catalog = replay(
            Dialect::Postgres,
            r#"
            CREATE TABLE public.category (
                category_id INT GENERATED BY DEFAULT AS IDENTITY,
                name TEXT NOT NULL DEFAULT 'misc' COLLATE "C",
                CONSTRAINT category_pkey PRIMARY KEY (category_id),
                CONSTRAINT category_name_key UNIQUE (name)
            );
            CREATE TABLE Film (
                film_id SERIAL PRIMARY KEY,
                category_id INT REFERENCES category (category_id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
                title TEXT GENERATED ALWAYS AS (upper(name)) STORED
            );
            "#,
        );
        let category = catalog.table("", "category").unwrap();
        assert_eq!(category.table_schema, "");
        let id = category.column(Dialect::Postgres, "category_id").unwrap();
        assert_eq!(id.identity, Identity::ByDefault);
        assert!(id.is_not_null);
        let name = category.column(Dialect::Postgres, "name").unwrap();
        assert_eq!(name.column_default.as_deref(), Some("'misc'"));
        assert_eq!(name.collation_name.as_deref(), Some("C"));
        assert_eq!(category.constraints.len(), 2);

        let film = catalog.table("public", "film").unwrap();
        assert_eq!(film.primary_key().unwrap().constraint_name, "film_pkey");
        let fk = film
            .constraints
            .iter()
            .find(|c| c.constraint_type == ConstraintType::ForeignKey)
            .unwrap();
        assert_eq!(fk.constraint_name, "film_category_id_fkey");
        assert_eq!(fk.references_table, "category");
        assert_eq!(fk.delete_rule, ReferentialAction::Cascade);
        assert!(fk.is_deferrable && fk.is_initially_deferred);
        let title = film.column(Dialect::Postgres, "title").unwrap();
        assert!(title.is_generated);
        assert_eq!(title.generated_expr.as_deref(), Some("upper(name)"));
    }

    #[test]
    fn test_statements_outside_ddl_are_skipped() {
        let catalog = replay(
            Dialect::Sqlite,
            "PRAGMA foreign_keys = ON;\n\
             CREATE TABLE a (id INTEGER);\n\
             INSERT INTO a VALUES (1);\n\
             CREATE TRIGGER t AFTER INSERT ON a BEGIN UPDATE a SET id = 2; END;\n\
             -- trailing comment",
        );
        assert_eq!(catalog.tables().count(), 1);
    }

    #[test]
    fn test_missing_objects_are_errors() {
        let err = replay_err(Dialect::Postgres, "ALTER TABLE film ADD COLUMN x INT");
        assert!(err.contains("0002_bad.sql"), "{err}");
        assert!(err.contains("film"), "{err}");

        let err = replay_err(Dialect::Postgres, "DROP INDEX film_title_idx");
        assert!(err.contains("film_title_idx"), "{err}");

        let err = replay_err(Dialect::Mysql, "CREATE TABLE a (id INT); CREATE TABLE a (id INT)");
        assert!(err.contains("already exists"), "{err}");

        let catalog = replay(
            Dialect::Postgres,
            "DROP TABLE IF EXISTS film; DROP VIEW IF EXISTS v; ALTER TABLE IF EXISTS film DROP COLUMN x",
        );
        assert_eq!(catalog.tables().count(), 0);
    }

    #[test]
    fn test_alter_table_actions() {
        let catalog = replay(
            Dialect::Postgres,
            "CREATE TABLE film (id INT, title TEXT, rating TEXT);\n\
             CREATE INDEX film_title_idx ON film (title);\n\
             ALTER TABLE film ADD CONSTRAINT film_pkey PRIMARY KEY (id);\n\
             ALTER TABLE film ALTER COLUMN title TYPE VARCHAR(100), ALTER COLUMN title SET NOT NULL;\n\
             ALTER TABLE film ALTER COLUMN rating SET DEFAULT 'G';\n\
             ALTER TABLE film ALTER COLUMN id ADD GENERATED ALWAYS AS IDENTITY;\n\
             ALTER TABLE film DROP COLUMN title;\n\
             ALTER TABLE film RENAME COLUMN rating TO mpaa;\n\
             ALTER TABLE film RENAME TO movie;",
        );
        let movie = catalog.table("", "movie").unwrap();
        assert!(catalog.table("", "film").is_none());
        assert!(movie.indexes.is_empty());
        assert_eq!(movie.column(Dialect::Postgres, "id").unwrap().identity, Identity::Always);
        assert!(movie.column(Dialect::Postgres, "id").unwrap().is_not_null);
        let mpaa = movie.column(Dialect::Postgres, "mpaa").unwrap();
        assert_eq!(mpaa.column_default.as_deref(), Some("'G'"));
        assert_eq!(movie.columns.len(), 2);
    }

    #[test]
    fn test_sqlserver_default_constraints() {
        let catalog = replay(
            Dialect::Sqlserver,
            "CREATE TABLE [film] (\n\
                 [id] INT IDENTITY(1,1) NOT NULL,\n\
                 [rating] NVARCHAR(10) CONSTRAINT [DF_film_rating] DEFAULT 'G',\n\
                 CONSTRAINT [film_pkey] PRIMARY KEY CLUSTERED ([id])\n\
             )\n\
             GO\n\
             ALTER TABLE [film] DROP CONSTRAINT [DF_film_rating];\n\
             ALTER TABLE [film] ADD [year] INT;\n\
             ALTER TABLE [film] ADD CONSTRAINT [DF_film_year] DEFAULT 2000 FOR [year];\n\
             ALTER TABLE [film] ALTER COLUMN [year] SMALLINT NOT NULL;\n\
             EXEC sp_rename 'dbo.film.rating', 'mpaa', 'COLUMN';",
        );
        let film = catalog.table("dbo", "FILM").unwrap();
        assert_eq!(film.column(Dialect::Sqlserver, "id").unwrap().identity, Identity::ByDefault);
        assert_eq!(film.column(Dialect::Sqlserver, "mpaa").unwrap().column_default, None);
        let year = film.column(Dialect::Sqlserver, "year").unwrap();
        assert_eq!(year.column_default.as_deref(), Some("2000"));
        assert_eq!(year.column_type, "SMALLINT");
        assert!(year.is_not_null);
    }

    #[test]
    fn test_mysql_inline_keys_and_modify() {
        let catalog = replay(
            Dialect::Mysql,
            "CREATE TABLE `film` (\n\
                 `id` INT NOT NULL AUTO_INCREMENT,\n\
                 `title` VARCHAR(255) NOT NULL,\n\
                 `updated` TIMESTAMP DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,\n\
                 PRIMARY KEY (`id`),\n\
                 UNIQUE KEY `film_title_key` (`title`),\n\
                 KEY `film_updated_idx` (`updated`)\n\
             ) ENGINE=InnoDB;\n\
             ALTER TABLE `film` MODIFY COLUMN `title` VARCHAR(100) NULL;\n\
             ALTER TABLE `film` DROP INDEX `film_updated_idx`;",
        );
        let film = catalog.table("", "film").unwrap();
        assert!(film.column(Dialect::Mysql, "id").unwrap().is_autoincrement);
        let updated = film.column(Dialect::Mysql, "updated").unwrap();
        assert!(updated.on_update_current_timestamp);
        assert_eq!(updated.column_default.as_deref(), Some("CURRENT_TIMESTAMP"));
        let title = film.column(Dialect::Mysql, "title").unwrap();
        assert_eq!(title.column_type, "VARCHAR(100)");
        assert!(!title.is_not_null);
        assert_eq!(film.constraints.len(), 2);
        assert!(film.indexes.is_empty());
    }

    #[test]
    fn test_complex_index_keeps_statement() {
        let catalog = replay(
            Dialect::Postgres,
            "CREATE TABLE film (title TEXT, year INT);\n\
             CREATE UNIQUE INDEX film_lower_title_idx ON film USING btree ((lower(title)), year DESC) WHERE year > 2000;",
        );
        let index = &catalog.table("", "film").unwrap().indexes[0];
        assert!(index.is_unique);
        assert_eq!(index.index_type, "BTREE");
        assert_eq!(index.columns, vec!["(lower(title))", "year"]);
        assert_eq!(index.descending, vec![false, true]);
        assert_eq!(index.predicate, "year > 2000");
        assert!(index.sql.starts_with("CREATE UNIQUE INDEX film_lower_title_idx"));
    }

    #[test]
    fn test_views() {
        let catalog = replay(
            Dialect::Postgres,
            "CREATE TABLE film (title TEXT);\n\
             CREATE VIEW titles AS SELECT title FROM film;\n\
             CREATE OR REPLACE VIEW titles AS SELECT upper(title) FROM film;\n\
             CREATE VIEW other AS SELECT 1;\n\
             DROP VIEW other;",
        );
        let views: Vec<_> = catalog.views().collect();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].sql, "SELECT upper(title) FROM film");
        assert!(replay_sql(Dialect::Postgres, "x.sql", "CREATE VIEW v AS SELECT 1; CREATE VIEW v AS SELECT 2").is_err());
    }

    #[test]
    fn test_enum_types_mark_columns() {
        let catalog = replay(
            Dialect::Postgres,
            "CREATE TYPE mpaa_rating AS ENUM ('G', 'PG');\n\
             CREATE TABLE film (rating mpaa_rating DEFAULT 'G'::mpaa_rating);",
        );
        let rating = catalog.table("", "film").unwrap().column(Dialect::Postgres, "rating").unwrap().clone();
        assert!(rating.is_enum);
        assert_eq!(rating.column_default.as_deref(), Some("'G'::mpaa_rating"));
    }

    /// Statements produced by each engine replay back to the destination.
    #[test]
    fn test_engine_output_converges() {
        let source_ddl = "table film {\n    film_id number primarykey\n    title string\n    rating string\n}\n";
        let dest_ddl = "table language {\n    language_id number primarykey\n    name string notnull unique\n}\n\n\
                        table film {\n    film_id number primarykey\n    title string notnull index\n    \
                        language_id number references={language.language_id ondelete=cascade}\n}\n";
        for dialect in Dialect::ALL {
            let source = parse_declarative(dialect, source_ddl).unwrap();
            let destination = parse_declarative(dialect, dest_ddl).unwrap();

            let setup = engine(dialect).diff(&Catalog::new(dialect), &source, true).unwrap();
            let output = engine(dialect).diff(&source, &destination, true).unwrap();
            let mut replayer = Replayer::new(dialect);
            for (i, batch) in setup.batches.iter().chain(&output.batches).enumerate() {
                replayer
                    .apply_sql(&format!("{i}.sql"), &batch.to_sql())
                    .unwrap_or_else(|e| panic!("{dialect}: {e}\n{}", batch.to_sql()));
            }
            let replayed = replayer.finish();
            let remaining = diff_catalogs(dialect, &replayed, &destination).unwrap();
            assert!(remaining.is_empty(), "{dialect}: {remaining:?}");
        }
    }

    #[test]
    fn test_replay_source_excludes_history() {
        let source = MigrationSource::from_files(
            "migrations",
            vec![
                MigrationFile::new("2_b.sql", "ALTER TABLE a ADD COLUMN b INT;"),
                MigrationFile::new("1_a.sql", "CREATE TABLE a (id INT);"),
                MigrationFile::new(
                    "0_history.sql",
                    "CREATE TABLE strata_history (filename TEXT); CREATE TABLE strata_history_lock (id INT);",
                ),
            ],
        );
        let catalog = replay_source(Dialect::Sqlite, &source, "strata_history").unwrap();
        let names: Vec<_> = catalog.tables().map(|t| t.table_name.as_str()).collect();
        assert_eq!(names, vec!["a"]);
        assert_eq!(catalog.table("", "a").unwrap().columns.len(), 2);
    }
}
