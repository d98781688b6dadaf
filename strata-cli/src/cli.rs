//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use strata_catalog::Dialect;

/// strata - schema migrations from catalog diffs
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(version)]
#[command(about = "strata - schema migrations from catalog diffs", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the config file (defaults to ./strata.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate migration files from the difference between two catalogs
    Generate(GenerateArgs),

    /// Apply pending and changed migration files
    Migrate(DatabaseArgs),

    /// Show the status of every migration file
    Ls(LsArgs),

    /// Record migration files as applied without running them
    Touch(TouchArgs),

    /// Print a catalog as declarative source
    Tables(TablesArgs),
}

fn parse_dialect(value: &str) -> Result<Dialect, String> {
    value.parse::<Dialect>().map_err(|e| e.to_string())
}

// =============================================================================
// Generate Command
// =============================================================================

/// Arguments for the `generate` command
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Current catalog: migration directory, .ddl, .json or .sql file (empty for none)
    #[arg(long, default_value = "")]
    pub src: String,

    /// Desired catalog: migration directory, .ddl, .json or .sql file
    #[arg(long)]
    pub dest: String,

    /// SQL dialect to generate for
    #[arg(long, value_parser = parse_dialect)]
    pub dialect: Option<Dialect>,

    /// Directory the migration files are written to
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// File name prefix (defaults to a UTC timestamp)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Emit DROP statements for objects missing from the destination
    #[arg(long)]
    pub drop_objects: bool,

    /// Print the files instead of writing them
    #[arg(long)]
    pub dry_run: bool,

    /// Write files even when warnings were generated
    #[arg(long)]
    pub accept_warnings: bool,
}

// =============================================================================
// Database Commands
// =============================================================================

/// Connection and directory arguments shared by database commands
#[derive(Args, Debug, Clone)]
pub struct DatabaseArgs {
    /// Database DSN
    #[arg(long, env = "STRATA_DATABASE_URL")]
    pub db: Option<String>,

    /// Migration directory
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

/// Arguments for the `ls` command
#[derive(Args, Debug)]
pub struct LsArgs {
    #[command(flatten)]
    pub database: DatabaseArgs,

    /// Print the status as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `touch` command
#[derive(Args, Debug)]
pub struct TouchArgs {
    #[command(flatten)]
    pub database: DatabaseArgs,

    /// Files to record, relative to the migration directory
    #[arg(required_unless_present = "glob")]
    pub files: Vec<String>,

    /// Record every file matching this pattern
    #[arg(long, conflicts_with = "files")]
    pub glob: Option<String>,
}

// =============================================================================
// Tables Command
// =============================================================================

/// Arguments for the `tables` command
#[derive(Args, Debug)]
pub struct TablesArgs {
    /// Catalog source: migration directory, .ddl, .json or .sql file
    #[arg(long)]
    pub src: String,

    /// SQL dialect of the source
    #[arg(long, value_parser = parse_dialect)]
    pub dialect: Option<Dialect>,

    /// Print a JSON snapshot instead of declarative source
    #[arg(long)]
    pub json: bool,
}
