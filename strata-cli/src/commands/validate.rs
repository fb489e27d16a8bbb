//! The `validate` command.

use crate::cli::ChangelogArgs;
use crate::error::CliResult;
use crate::output;

use super::{build_executor, load_changelog, resolve_changelog_args};

/// Validate the changelog against the target database without executing
/// anything. Every problem is reported at once.
pub async fn run(args: ChangelogArgs) -> CliResult<()> {
    let resolved = resolve_changelog_args(&args).await?;
    let changelog = load_changelog(&resolved.changelog_file).await?;
    let mut executor =
        build_executor(&resolved.settings, resolved.contexts, resolved.labels).await?;

    executor.validate(&changelog).await?;

    output::success(&format!(
        "No validation errors in {} ({} change sets)",
        changelog.logical_path,
        changelog.change_sets.len()
    ));
    Ok(())
}
