//! The generate workflow: load two catalogs, diff them, write migration files.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use strata_catalog::Dialect;
use tracing::{info, warn};

use crate::dialect::{NamedSqlBatch, engine};
use crate::error::{MigrateResult, MigrationError};
use crate::history::DEFAULT_HISTORY_TABLE;
use crate::source::load_catalog;

/// Inputs of a generate run.
#[derive(Debug, Clone)]
pub struct GenerateConfig {
    /// Catalog the database has now. Empty means no tables.
    pub src: String,
    /// Catalog the database should have.
    pub dest: String,
    pub dialect: Dialect,
    pub output_dir: PathBuf,
    /// File name prefix; a UTC timestamp when unset.
    pub prefix: Option<String>,
    /// Emit destructive statements for objects missing from `dest`.
    pub drop_objects: bool,
    /// Compute the files without writing them.
    pub dry_run: bool,
    /// Write files even when the diff produced warnings.
    pub accept_warnings: bool,
    /// History table left out when replaying migration directories.
    pub history_table: String,
}

impl GenerateConfig {
    pub fn new(src: impl Into<String>, dest: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            src: src.into(),
            dest: dest.into(),
            dialect,
            output_dir: PathBuf::from("migrations"),
            prefix: None,
            drop_objects: false,
            dry_run: false,
            accept_warnings: false,
            history_table: DEFAULT_HISTORY_TABLE.to_string(),
        }
    }

    /// Set the output directory.
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the file name prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Allow destructive statements.
    pub fn drop_objects(mut self, drop: bool) -> Self {
        self.drop_objects = drop;
        self
    }

    /// Compute without writing.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Write files despite warnings.
    pub fn accept_warnings(mut self, accept: bool) -> Self {
        self.accept_warnings = accept;
        self
    }

    /// Set the history table name.
    pub fn history_table(mut self, table: impl Into<String>) -> Self {
        self.history_table = table.into();
        self
    }
}

/// A migration file produced by a generate run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedFile {
    pub path: PathBuf,
    pub sql: String,
    pub statements: usize,
}

/// Result of a generate run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerateOutcome {
    /// Files in apply order. Empty when the catalogs are equivalent.
    pub files: Vec<GeneratedFile>,
    pub warnings: Vec<String>,
    /// False for dry runs.
    pub written: bool,
}

impl GenerateOutcome {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Diff `config.src` against `config.dest` and write the migration files.
///
/// Warnings are checked before anything touches the disk: without
/// `accept_warnings` they fail the run and no file is written.
pub async fn generate(config: &GenerateConfig) -> MigrateResult<GenerateOutcome> {
    let source = load_catalog(&config.src, config.dialect, &config.history_table).await?;
    let dest = load_catalog(&config.dest, config.dialect, &config.history_table).await?;
    let diff = engine(config.dialect).diff(&source, &dest, config.drop_objects)?;

    for warning in &diff.warnings {
        warn!(%warning, "migration warning");
    }
    if !diff.warnings.is_empty() && !config.accept_warnings {
        return Err(MigrationError::UnacceptedWarnings {
            warnings: diff.warnings,
        });
    }

    let prefix = config
        .prefix
        .clone()
        .unwrap_or_else(|| Utc::now().format("%Y%m%d%H%M%S").to_string());
    let files: Vec<GeneratedFile> = diff
        .batches
        .iter()
        .filter(|batch| !batch.is_empty())
        .map(|batch| GeneratedFile {
            path: config.output_dir.join(file_name(&prefix, batch)),
            sql: render(config.dialect, batch),
            statements: batch.statements.len(),
        })
        .collect();

    if files.is_empty() {
        info!("catalogs are equivalent, nothing to generate");
        return Ok(GenerateOutcome {
            files,
            warnings: diff.warnings,
            written: false,
        });
    }

    let written = !config.dry_run;
    if written {
        write_files(&config.output_dir, &files).await?;
    }
    info!(files = files.len(), dry_run = config.dry_run, "generated migration");
    Ok(GenerateOutcome {
        files,
        warnings: diff.warnings,
        written,
    })
}

fn file_name(prefix: &str, batch: &NamedSqlBatch) -> String {
    if batch.name.is_empty() {
        format!("{prefix}.sql")
    } else {
        format!("{prefix}_{}.sql", batch.name)
    }
}

/// A batch as file contents, headed by a comment naming the dialect.
pub fn render(dialect: Dialect, batch: &NamedSqlBatch) -> String {
    format!("-- strata migration for {dialect}\n\n{}", batch.to_sql())
}

async fn write_files(dir: &Path, files: &[GeneratedFile]) -> MigrateResult<()> {
    tokio::fs::create_dir_all(dir).await?;
    for file in files {
        if tokio::fs::try_exists(&file.path).await? {
            return Err(MigrationError::other(format!(
                "refusing to overwrite existing migration {}",
                file.path.display()
            )));
        }
    }
    for file in files {
        tokio::fs::write(&file.path, &file.sql).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    const FILM: &str = "table film {\n    film_id number primarykey\n    title string\n}\n";

    fn setup() -> (TempDir, String) {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("dest.ddl");
        std::fs::write(&dest, FILM).unwrap();
        let dest = dest.to_str().unwrap().to_string();
        (dir, dest)
    }

    #[tokio::test]
    async fn test_generate_writes_prefixed_file() {
        let (dir, dest) = setup();
        let out = dir.path().join("migrations");
        let config = GenerateConfig::new("", &dest, Dialect::Postgres)
            .output_dir(&out)
            .prefix("0001_init");

        let outcome = generate(&config).await.unwrap();
        assert!(outcome.written);
        assert_eq!(outcome.files.len(), 1);
        let path = out.join("0001_init.sql");
        assert_eq!(outcome.files[0].path, path);
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("-- strata migration for postgres\n\nCREATE TABLE"));
        assert!(written.ends_with(";\n\n"));

        // Same again refuses to clobber.
        assert!(generate(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_equivalent_catalogs_write_nothing() {
        let (dir, dest) = setup();
        let out = dir.path().join("migrations");
        let outcome = generate(&GenerateConfig::new(&dest, &dest, Dialect::Sqlite).output_dir(&out))
            .await
            .unwrap();
        assert!(outcome.is_empty());
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_dry_run_does_not_write() {
        let (dir, dest) = setup();
        let out = dir.path().join("migrations");
        let outcome = generate(
            &GenerateConfig::new("", &dest, Dialect::Mysql)
                .output_dir(&out)
                .dry_run(true),
        )
        .await
        .unwrap();
        assert!(!outcome.written);
        assert_eq!(outcome.files.len(), 1);
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_warnings_block_writing_unless_accepted() {
        let (dir, dest) = setup();
        let empty = dir.path().join("empty.ddl");
        std::fs::write(&empty, "").unwrap();
        let out = dir.path().join("migrations");
        let base = GenerateConfig::new(&dest, empty.to_str().unwrap(), Dialect::Postgres)
            .output_dir(&out)
            .prefix("0002_drop");

        let err = generate(&base).await.unwrap_err();
        match err {
            MigrationError::UnacceptedWarnings { warnings } => assert_eq!(warnings.len(), 1),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!out.exists());

        let outcome = generate(&base.clone().accept_warnings(true)).await.unwrap();
        assert!(outcome.is_empty());
        assert_eq!(outcome.warnings.len(), 1);

        let outcome = generate(&base.drop_objects(true)).await.unwrap();
        assert!(outcome.warnings.is_empty());
        let sql = std::fs::read_to_string(out.join("0002_drop.sql")).unwrap();
        assert!(sql.contains("DROP TABLE"));
    }
}
