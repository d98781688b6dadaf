//! `strata migrate`, `strata ls` and `strata touch`.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cli::{DatabaseArgs, LsArgs, TouchArgs};
use crate::commands::{Context, load_source, open_runner};
use crate::error::CliResult;
use crate::output::{self, success};

/// Run `strata migrate` - apply pending and changed files
pub async fn run_migrate(ctx: &Context, args: DatabaseArgs) -> CliResult<()> {
    output::header("Migrate");
    let runner = open_runner(ctx, &args).await?;
    let source = load_source(ctx, &args).await?;
    output::kv("Migrations", &source.dir().display().to_string());
    output::kv("Files", &source.files().len().to_string());
    output::newline();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received, stopping after the current file");
            on_interrupt.cancel();
        }
    });

    let result = runner.migrate(&source, &cancel).await;
    watcher.abort();
    let report = result?;

    for file in &report.applied {
        output::list_item(&format!("applied {file}"));
    }
    for file in &report.reapplied {
        output::list_item(&format!("reapplied {file}"));
    }
    if report.has_changes() {
        output::newline();
        success(&report.summary());
    } else {
        success("Database is up to date");
    }
    Ok(())
}

/// Run `strata ls` - show file status without changing anything
pub async fn run_ls(ctx: &Context, args: LsArgs) -> CliResult<()> {
    let runner = open_runner(ctx, &args.database).await?;
    let source = load_source(ctx, &args.database).await?;
    let statuses = runner.ls(&source).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    output::header("Migration Status");
    if statuses.is_empty() {
        output::dim("No migration files");
        return Ok(());
    }
    for status in &statuses {
        let applied_at = status
            .applied_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        println!(
            "  {} {}  {}",
            output::style_state(status.state),
            status.filename,
            applied_at
        );
    }
    Ok(())
}

/// Run `strata touch` - record files as applied without executing them
pub async fn run_touch(ctx: &Context, args: TouchArgs) -> CliResult<()> {
    output::header("Touch");
    let runner = open_runner(ctx, &args.database).await?;
    let source = load_source(ctx, &args.database).await?;

    let touched = match &args.glob {
        Some(pattern) => runner.touch_glob(&source, pattern).await?,
        None => runner.touch(&source, &args.files).await?,
    };
    for file in &touched {
        output::list_item(file);
    }
    output::newline();
    success(&format!("Recorded {} file(s) as applied", touched.len()));
    Ok(())
}
