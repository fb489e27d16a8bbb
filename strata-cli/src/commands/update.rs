//! The `update` command.

use strata_core::ChangeSetOutcome;

use crate::cli::UpdateArgs;
use crate::error::CliResult;
use crate::output;

use super::{build_executor, load_changelog, resolve_changelog_args};

/// Apply pending change sets, or print their SQL with `--dry-run`.
pub async fn run(args: UpdateArgs) -> CliResult<()> {
    let resolved = resolve_changelog_args(&args.changelog).await?;
    let changelog = load_changelog(&resolved.changelog_file).await?;
    let mut executor =
        build_executor(&resolved.settings, resolved.contexts, resolved.labels).await?;

    if args.dry_run {
        let report = executor.update_sql(&changelog).await?;
        output::header("Update SQL");
        for statement in &report.statements {
            output::sql(statement);
        }
        output::newline();
        output::info(&report.summary());
        return Ok(());
    }

    let report = executor.update(&changelog).await?;

    for entry in &report.change_sets {
        match entry.outcome {
            ChangeSetOutcome::Executed | ChangeSetOutcome::Reran => {
                output::list_item(&format!("{} applied", entry.identity));
            }
            ChangeSetOutcome::MarkRan => {
                output::list_item(&format!("{} marked ran", entry.identity));
            }
            ChangeSetOutcome::Failed => {
                output::warn(&format!(
                    "{} failed: {}",
                    entry.identity,
                    entry.reason.as_deref().unwrap_or("unknown")
                ));
            }
            ChangeSetOutcome::Skipped | ChangeSetOutcome::RolledBack => {}
        }
    }

    output::success(&report.summary());
    Ok(())
}
