//! SQLite migration database for strata.
//!
//! [`SqliteDatabase`] implements [`MigrationDatabase`](strata_migrate::MigrationDatabase)
//! on a single `tokio-rusqlite` connection. Each migration file and its
//! history row commit in one transaction; the migration lock is a one-row
//! table next to the history table.
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_migrate::{MigrationRunner, MigrationSource, RunnerConfig};
//! use strata_sqlite::SqliteDatabase;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = SqliteDatabase::connect("sqlite://app.db").await?;
//!     let source = MigrationSource::load("migrations").await?;
//!     let runner = MigrationRunner::new(db, RunnerConfig::new());
//!     let report = runner.migrate(&source, &CancellationToken::new()).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod database;
pub mod error;

pub use config::{DEFAULT_STALE_LOCK_SECS, DatabasePath, JournalMode, SqliteConfig};
pub use database::SqliteDatabase;
