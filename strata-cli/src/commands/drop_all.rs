//! The `drop-all` command.

use crate::cli::DropAllArgs;
use crate::error::CliResult;
use crate::output;

use super::{build_executor, resolve_connection_args};

/// Drop every table in the default schema, ledger and lock tables last.
pub async fn run(args: DropAllArgs) -> CliResult<()> {
    let settings = resolve_connection_args(&args.connection).await?;

    if !args.force {
        output::warn(&format!(
            "This drops every table reachable through {}",
            settings.url
        ));
        if !output::confirm("Continue?") {
            output::info("Aborted");
            return Ok(());
        }
    }

    let mut executor = build_executor(&settings, Vec::new(), Vec::new()).await?;
    let dropped = executor.drop_all().await?;

    for table in &dropped {
        output::list_item(&format!("dropped {table}"));
    }
    output::success(&format!("Dropped {} tables", dropped.len()));
    Ok(())
}
