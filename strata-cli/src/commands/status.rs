//! The `status` command.

use crate::cli::ChangelogArgs;
use crate::error::CliResult;
use crate::output;

use super::{build_executor, load_changelog, resolve_changelog_args};

/// Report pending and unexpected change sets.
pub async fn run(args: ChangelogArgs) -> CliResult<()> {
    let resolved = resolve_changelog_args(&args).await?;
    let changelog = load_changelog(&resolved.changelog_file).await?;
    let mut executor =
        build_executor(&resolved.settings, resolved.contexts, resolved.labels).await?;

    let status = executor.status(&changelog).await?;

    output::header("Migration status");
    output::kv("applied", &status.ran.len().to_string());
    output::kv("pending", &status.pending.len().to_string());

    if !status.pending.is_empty() {
        output::newline();
        output::info("Pending change sets:");
        for identity in &status.pending {
            output::list_item(&identity.to_string());
        }
    }

    if !status.unexpected.is_empty() {
        output::newline();
        output::warn("Ledger rows not present in the changelog:");
        for identity in &status.unexpected {
            output::list_item(&identity.to_string());
        }
    }

    if status.is_up_to_date() {
        output::newline();
        output::success("Database is up to date");
    }

    Ok(())
}
