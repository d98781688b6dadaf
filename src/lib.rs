//! # strata
//!
//! Schema migrations from catalog diffs.
//!
//! strata provides:
//! - A catalog model of schemas, tables, columns, constraints, indexes and views
//! - A declarative `.ddl` format and a compact modifier language to describe them
//! - One DDL engine per dialect (SQLite, PostgreSQL, MySQL, SQL Server) that
//!   turns the difference between two catalogs into ordered statements
//! - A migration runner with checksum history, drift detection, repeatable
//!   files and touch/ls operations
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use strata::prelude::*;
//!
//! let current = parse_declarative(Dialect::Postgres, "")?;
//! let wanted = parse_declarative(Dialect::Postgres, r#"
//! table category {
//!     category_id  number  primarykey identity
//!     category     string  unique
//! }
//! "#)?;
//!
//! let output = diff(Dialect::Postgres, &current, &wanted, false)?;
//! for statement in output.statements() {
//!     println!("{statement};");
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Catalog model, modifier language and declarative source.
pub mod catalog {
    pub use strata_catalog::*;
}

/// Diffing, DDL engines, replay and the migration runner.
pub mod migrate {
    pub use strata_migrate::*;
}

/// The SQLite migration database.
#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite {
    pub use strata_sqlite::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::catalog::{Catalog, Dialect, parse_declarative, write_declarative};
    pub use crate::migrate::{
        DiffOutput, GenerateConfig, MigrationRunner, MigrationSource, RunnerConfig, diff,
        generate,
    };
}

// Re-export key types at the crate root
pub use strata_catalog::{Catalog, CatalogError, Dialect};
pub use strata_migrate::{MigrateResult, MigrationError, diff};
