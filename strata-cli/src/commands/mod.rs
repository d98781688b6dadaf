//! CLI command implementations.

pub mod generate;
pub mod migrate;
pub mod tables;

use std::path::{Path, PathBuf};

use strata_catalog::Dialect;
use strata_migrate::{MigrationRunner, MigrationSource, dialect_from_dsn};
use strata_sqlite::SqliteDatabase;

use crate::cli::DatabaseArgs;
use crate::config::Config;
use crate::error::{CliError, CliResult};

/// Shared state for one command invocation.
#[derive(Debug, Clone)]
pub struct Context {
    pub cwd: PathBuf,
    pub config: Config,
}

impl Context {
    /// Build the context from the working directory and an optional
    /// explicit config path.
    pub fn load(config_path: Option<&Path>) -> CliResult<Self> {
        let cwd = std::env::current_dir()?;
        let config = Config::discover(&cwd, config_path)?;
        Ok(Self { cwd, config })
    }

    /// Resolve the dialect from a flag, then the config file.
    pub fn dialect(&self, flag: Option<Dialect>) -> CliResult<Dialect> {
        match flag {
            Some(dialect) => Ok(dialect),
            None => self.config.dialect()?.ok_or_else(|| {
                CliError::Config(
                    "no dialect given: pass --dialect or set [database] dialect".to_string(),
                )
            }),
        }
    }

    /// Migration directory from a flag, then the config file.
    pub fn migrations_dir(&self, flag: Option<&Path>) -> PathBuf {
        let dir = flag.unwrap_or(&self.config.migrations.directory);
        self.cwd.join(dir)
    }

    pub fn history_table(&self) -> &str {
        &self.config.migrations.history_table
    }
}

/// Open the database named by `--db` (or the config file) and wrap it in
/// a runner. Only SQLite has a bundled connection.
pub async fn open_runner(
    ctx: &Context,
    args: &DatabaseArgs,
) -> CliResult<MigrationRunner<SqliteDatabase>> {
    let dsn = args
        .db
        .clone()
        .or_else(|| ctx.config.database.url.clone())
        .ok_or_else(|| {
            CliError::Config("no database given: pass --db or set [database] url".to_string())
        })?;
    let dialect = match dialect_from_dsn(&dsn) {
        Some(dialect) => dialect,
        None => ctx.dialect(None)?,
    };

    let registry = strata_migrate::DriverRegistry::with_defaults();
    let capabilities = *registry.require(dialect)?;
    if dialect != Dialect::Sqlite {
        return Err(CliError::Database(format!(
            "no connection driver bundled for {dialect} ({} driver)",
            capabilities.driver_name
        )));
    }

    let db = SqliteDatabase::connect(&capabilities.preprocess_dsn(&dsn)).await?;
    Ok(MigrationRunner::new(db, ctx.config.runner_config()).with_capabilities(capabilities))
}

/// Load the migration directory.
pub async fn load_source(ctx: &Context, args: &DatabaseArgs) -> CliResult<MigrationSource> {
    let dir = ctx.migrations_dir(args.dir.as_deref());
    Ok(MigrationSource::load(&dir).await?)
}
