//! `strata generate` - write migration files from a catalog diff.

use strata_migrate::{GenerateConfig, MigrationError, generate};

use crate::cli::GenerateArgs;
use crate::commands::Context;
use crate::error::{CliError, CliResult};
use crate::output::{self, success, warn};

/// Run the generate command
pub async fn run(ctx: &Context, args: GenerateArgs) -> CliResult<()> {
    let dialect = ctx.dialect(args.dialect)?;
    let output_dir = match args.output_dir.or_else(|| ctx.config.generate.output_dir.clone()) {
        Some(dir) => ctx.cwd.join(dir),
        None => ctx.migrations_dir(None),
    };

    output::header("Generate");
    output::kv("Source", if args.src.is_empty() { "(empty)" } else { args.src.as_str() });
    output::kv("Destination", &args.dest);
    output::kv("Dialect", dialect.as_str());
    output::kv("Output", &output_dir.display().to_string());
    output::newline();

    let mut config = GenerateConfig::new(&args.src, &args.dest, dialect)
        .output_dir(&output_dir)
        .drop_objects(args.drop_objects || ctx.config.generate.drop_objects)
        .dry_run(args.dry_run)
        .accept_warnings(args.accept_warnings || ctx.config.generate.accept_warnings)
        .history_table(ctx.history_table());
    if let Some(prefix) = args.prefix {
        config = config.prefix(prefix);
    }

    let outcome = match generate(&config).await {
        Ok(outcome) => outcome,
        Err(MigrationError::UnacceptedWarnings { warnings }) => {
            for warning in &warnings {
                warn(warning);
            }
            output::newline();
            return Err(CliError::Command(format!(
                "{} warning(s) generated; nothing written. Re-run with --accept-warnings to write the migration anyway",
                warnings.len()
            )));
        }
        Err(err) => return Err(err.into()),
    };

    for warning in &outcome.warnings {
        warn(warning);
    }
    if outcome.is_empty() {
        success("Catalogs are equivalent, no migration generated");
        return Ok(());
    }

    for file in &outcome.files {
        let label = format!("{} ({} statements)", file.path.display(), file.statements);
        if outcome.written {
            output::list_item(&label);
        } else {
            output::info(&format!("Would write {label}"));
            output::code(&file.sql);
        }
    }
    output::newline();
    if outcome.written {
        success(&format!("Generated {} migration file(s)", outcome.files.len()));
    } else {
        output::dim("Dry run: nothing written");
    }
    Ok(())
}
