//! # strata-migrate
//!
//! Diffing, DDL generation and migration tracking for strata.
//!
//! This crate provides functionality for:
//! - Structural diffing of two [`Catalog`](strata_catalog::Catalog)s
//! - One DDL engine per dialect (sqlite, postgres, mysql, sqlserver) turning
//!   a diff into ordered statements plus capability warnings
//! - Replaying a directory of SQL migrations into a catalog without a database
//! - Applying migration files with checksum history, drift detection,
//!   repeatable files and a migration-wide lock
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌────────────────┐
//! │ .ddl / .json │────▶│                │     │ Dialect engine │
//! └──────────────┘     │ Catalog differ │────▶│  plan + render │
//! ┌──────────────┐     │                │     └────────────────┘
//! │ migrations/  │────▶│                │             │
//! │  (replayed)  │     └────────────────┘             ▼
//! └──────────────┘                            ┌────────────────┐
//!        ▲                                    │  NNNN_x.sql    │
//!        │            ┌────────────────┐      └────────────────┘
//!        └────────────│ Runner/history │◀────────────┘
//!                     └────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_migrate::{GenerateConfig, MigrationRunner, MigrationSource, RunnerConfig, generate};
//! use strata_catalog::Dialect;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn run(db: impl strata_migrate::MigrationDatabase) -> Result<(), Box<dyn std::error::Error>> {
//!     // Write the statements that take migrations/ to schema.ddl
//!     let outcome = generate(
//!         &GenerateConfig::new("migrations", "schema.ddl", Dialect::Sqlite)
//!             .output_dir("migrations"),
//!     )
//!     .await?;
//!     println!("{} file(s) written", outcome.files.len());
//!
//!     // Apply whatever is pending
//!     let source = MigrationSource::load("migrations").await?;
//!     let runner = MigrationRunner::new(db, RunnerConfig::new());
//!     let report = runner.migrate(&source, &CancellationToken::new()).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```
//!
//! ## Migration directory
//!
//! ```text
//! migrations/
//! ├── 0001_create_film.sql
//! ├── 0002_add_rating.sql
//! └── repeatable/
//!     └── views/
//!         └── film_list.sql
//! ```
//!
//! Regular files run once, in numeric-prefix order. Files under
//! `repeatable/` run after them and again whenever their content changes.

pub mod dialect;
pub mod diff;
pub mod driver;
pub mod error;
pub mod file;
pub mod generate;
pub mod history;
mod plan;
pub mod replay;
pub mod runner;
pub mod source;

pub use dialect::{
    DialectEngine, DiffOutput, FKEYS_BATCH, MysqlEngine, NamedSqlBatch, PostgresEngine,
    SqliteEngine, SqlserverEngine, engine, engine_for,
};
pub use diff::{CatalogDiff, ColumnChange, TableDiff, diff_catalogs};
pub use driver::{DriverCapabilities, DriverRegistry, dialect_from_dsn};
pub use error::{DatabaseErrorInfo, MigrateResult, MigrationError};
pub use file::{MigrationFile, MigrationSource, compute_checksum};
pub use generate::{GenerateConfig, GenerateOutcome, GeneratedFile, generate};
pub use history::{DEFAULT_HISTORY_TABLE, HistoryRecord, HistorySql};
pub use replay::{Replayer, replay_directory, replay_source, replay_sql, split_statements};
pub use runner::{
    ApplyUnit, FileState, FileStatus, MigrateReport, MigrationDatabase, MigrationRunner,
    RunnerConfig,
};
pub use source::{SourceKind, load_catalog};

/// Diff two catalogs with the engine for `dialect`.
///
/// Shorthand for `engine(dialect).diff(source, dest, allow_drops)`.
pub fn diff(
    dialect: strata_catalog::Dialect,
    source: &strata_catalog::Catalog,
    dest: &strata_catalog::Catalog,
    allow_drops: bool,
) -> MigrateResult<DiffOutput> {
    engine(dialect).diff(source, dest, allow_drops)
}
