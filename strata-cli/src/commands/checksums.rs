//! The `clear-checksums` command.

use crate::cli::ConnectionOnlyArgs;
use crate::error::CliResult;
use crate::output;

use super::{build_executor, resolve_connection_args};

/// Null out every stored checksum; the next update revalidates and refills
/// them.
pub async fn run(args: ConnectionOnlyArgs) -> CliResult<()> {
    let settings = resolve_connection_args(&args.connection).await?;
    let mut executor = build_executor(&settings, Vec::new(), Vec::new()).await?;

    executor.clear_checksums().await?;
    output::success("Cleared stored checksums");
    Ok(())
}
