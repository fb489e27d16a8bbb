//! The `tag` command.

use crate::cli::TagArgs;
use crate::error::CliResult;
use crate::output;

use super::{build_executor, resolve_connection_args};

/// Tag the most recently applied change set as a rollback anchor.
pub async fn run(args: TagArgs) -> CliResult<()> {
    let settings = resolve_connection_args(&args.connection).await?;
    let mut executor = build_executor(&settings, Vec::new(), Vec::new()).await?;

    executor.tag(&args.tag).await?;
    output::success(&format!("Tagged database as '{}'", args.tag));
    Ok(())
}
