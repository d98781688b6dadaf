//! strata CLI - command-line interface for strata schema migrations.

use clap::Parser;

use strata_cli::cli::{Cli, Command};
use strata_cli::commands::{self, Context};
use strata_cli::error::CliResult;
use strata_cli::{logging, output};

#[tokio::main]
async fn main() {
    logging::init();

    if let Err(e) = run().await {
        output::newline();
        if e.has_source_code() {
            eprintln!("{:?}", miette::Report::new(e));
        } else {
            output::error(&e.to_string());
        }
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let ctx = Context::load(cli.config.as_deref())?;

    match cli.command {
        Command::Generate(args) => commands::generate::run(&ctx, args).await,
        Command::Migrate(args) => commands::migrate::run_migrate(&ctx, args).await,
        Command::Ls(args) => commands::migrate::run_ls(&ctx, args).await,
        Command::Touch(args) => commands::migrate::run_touch(&ctx, args).await,
        Command::Tables(args) => commands::tables::run(&ctx, args).await,
    }
}
