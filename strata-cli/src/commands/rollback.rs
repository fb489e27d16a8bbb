//! The `rollback` command.

use chrono::{DateTime, Utc};
use strata_core::RollbackTarget;

use crate::cli::RollbackArgs;
use crate::error::{CliError, CliResult};
use crate::output;

use super::{build_executor, load_changelog, resolve_changelog_args};

fn target_from(args: &RollbackArgs) -> CliResult<RollbackTarget> {
    if let Some(tag) = &args.tag {
        return Ok(RollbackTarget::Tag(tag.clone()));
    }
    if let Some(count) = args.count {
        if count == 0 {
            return Err(CliError::Command("--count must be at least 1".to_string()));
        }
        return Ok(RollbackTarget::Count(count));
    }
    if let Some(raw) = &args.to_date {
        let date = DateTime::parse_from_rfc3339(raw)
            .map_err(|e| CliError::Command(format!("invalid --to-date '{raw}': {e}")))?
            .with_timezone(&Utc);
        return Ok(RollbackTarget::ToDate(date));
    }
    Err(CliError::Command(
        "rollback needs a boundary: --tag, --count, or --to-date".to_string(),
    ))
}

/// Roll back applied change sets down to the requested boundary.
pub async fn run(args: RollbackArgs) -> CliResult<()> {
    let target = target_from(&args)?;
    let resolved = resolve_changelog_args(&args.changelog).await?;
    let changelog = load_changelog(&resolved.changelog_file).await?;
    let mut executor =
        build_executor(&resolved.settings, resolved.contexts, resolved.labels).await?;

    if args.dry_run {
        let report = executor.rollback_sql(&changelog, target).await?;
        output::header("Rollback SQL");
        for statement in &report.statements {
            output::sql(statement);
        }
        output::newline();
        output::info(&report.summary());
        return Ok(());
    }

    let report = executor.rollback(&changelog, target).await?;
    for entry in &report.change_sets {
        output::list_item(&format!("{} rolled back", entry.identity));
    }
    output::success(&report.summary());
    Ok(())
}
