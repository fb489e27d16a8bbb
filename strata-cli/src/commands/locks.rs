//! The `list-locks` and `release-locks` commands.

use crate::cli::ConnectionOnlyArgs;
use crate::error::CliResult;
use crate::output;

use super::{build_executor, resolve_connection_args};

/// Show who holds the change log lock.
pub async fn run_list(args: ConnectionOnlyArgs) -> CliResult<()> {
    let settings = resolve_connection_args(&args.connection).await?;
    let mut executor = build_executor(&settings, Vec::new(), Vec::new()).await?;

    let locks = executor.list_locks().await?;
    if locks.is_empty() {
        output::success("No change log locks held");
        return Ok(());
    }

    output::header("Change log locks");
    for lock in locks {
        let holder = lock.locked_by.as_deref().unwrap_or("unknown");
        let granted = lock
            .lock_granted
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string());
        output::list_item(&format!("held by {holder} since {granted}"));
    }
    Ok(())
}

/// Force-release the change log lock.
pub async fn run_release(args: ConnectionOnlyArgs) -> CliResult<()> {
    let settings = resolve_connection_args(&args.connection).await?;
    let mut executor = build_executor(&settings, Vec::new(), Vec::new()).await?;

    executor.release_locks().await?;
    output::success("Released the change log lock");
    Ok(())
}
