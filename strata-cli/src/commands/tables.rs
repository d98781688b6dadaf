//! `strata tables` - print a catalog as declarative source.

use strata_catalog::{to_json, write_declarative};
use strata_migrate::load_catalog;

use crate::cli::TablesArgs;
use crate::commands::Context;
use crate::error::CliResult;

/// Run the tables command. Output goes to stdout undecorated so it can be
/// redirected into a `.ddl` or `.json` file.
pub async fn run(ctx: &Context, args: TablesArgs) -> CliResult<()> {
    let dialect = ctx.dialect(args.dialect)?;
    let catalog = load_catalog(&args.src, dialect, ctx.history_table()).await?;
    if args.json {
        println!("{}", to_json(&catalog)?);
    } else {
        print!("{}", write_declarative(&catalog));
    }
    Ok(())
}
