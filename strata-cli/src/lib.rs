//! strata CLI - command-line interface for strata schema migrations.
//!
//! `generate` diffs two catalogs into migration files; `migrate`, `ls` and
//! `touch` work a migration directory against a database; `tables` prints a
//! catalog as declarative source.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
