//! The `changelog-sync` command.

use crate::cli::ChangelogArgs;
use crate::error::CliResult;
use crate::output;

use super::{build_executor, load_changelog, resolve_changelog_args};

/// Mark all unran change sets as applied without executing them. Used when
/// adopting an existing database that already has the schema.
pub async fn run(args: ChangelogArgs) -> CliResult<()> {
    let resolved = resolve_changelog_args(&args).await?;
    let changelog = load_changelog(&resolved.changelog_file).await?;
    let mut executor =
        build_executor(&resolved.settings, resolved.contexts, resolved.labels).await?;

    let report = executor.changelog_sync(&changelog).await?;
    for entry in &report.change_sets {
        output::list_item(&format!("{} marked ran", entry.identity));
    }
    output::success(&report.summary());
    Ok(())
}
