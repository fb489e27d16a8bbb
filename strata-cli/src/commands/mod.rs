//! Command implementations.

pub mod checksums;
pub mod drop_all;
pub mod locks;
pub mod rollback;
pub mod status;
pub mod sync;
pub mod tag;
pub mod update;
pub mod validate;

use std::path::PathBuf;

use strata_core::{ChangeLog, Executor, RunOptions, TableHistoryService, TableLockService};

use crate::cli::{ChangelogArgs, ConnectionArgs};
use crate::config::StrataConfig;
use crate::db::{self, ConnectionSettings};
use crate::error::{CliError, CliResult};

/// Fully resolved settings for a changelog-driven command: CLI flags first,
/// then `strata.toml`, then environment (via clap's env support).
pub(crate) struct ResolvedArgs {
    pub changelog_file: PathBuf,
    pub settings: ConnectionSettings,
    pub contexts: Vec<String>,
    pub labels: Vec<String>,
}

pub(crate) async fn resolve_changelog_args(args: &ChangelogArgs) -> CliResult<ResolvedArgs> {
    let config = StrataConfig::load().await?;
    let settings = resolve_connection_with(&args.connection, &config)?;

    let changelog_file = args
        .changelog_file
        .clone()
        .or(config.changelog_file)
        .ok_or_else(|| {
            CliError::Config(
                "missing changelog file: pass --changelog-file or set it in strata.toml"
                    .to_string(),
            )
        })?;

    let contexts = if args.contexts.is_empty() {
        config.contexts
    } else {
        args.contexts.clone()
    };
    let labels = if args.labels.is_empty() {
        config.labels
    } else {
        args.labels.clone()
    };

    Ok(ResolvedArgs {
        changelog_file,
        settings,
        contexts,
        labels,
    })
}

pub(crate) async fn resolve_connection_args(args: &ConnectionArgs) -> CliResult<ConnectionSettings> {
    let config = StrataConfig::load().await?;
    resolve_connection_with(args, &config)
}

fn resolve_connection_with(
    args: &ConnectionArgs,
    config: &StrataConfig,
) -> CliResult<ConnectionSettings> {
    let url = args.url.clone().or_else(|| config.url.clone()).ok_or_else(|| {
        CliError::Config("missing database URL: pass --url or set it in strata.toml".to_string())
    })?;

    Ok(ConnectionSettings {
        url,
        username: args.username.clone().or_else(|| config.username.clone()),
        password: args.password.clone().or_else(|| config.password.clone()),
    })
}

/// The lock holder identity recorded in the lock table.
fn actor() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "strata".to_string());
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    format!("{user}@{host}")
}

pub(crate) async fn build_executor(
    settings: &ConnectionSettings,
    contexts: Vec<String>,
    labels: Vec<String>,
) -> CliResult<Executor<TableHistoryService, TableLockService>> {
    let database = db::connect(settings).await?;
    let options = RunOptions::new()
        .contexts(contexts)
        .labels(labels)
        .actor(actor());
    Ok(
        Executor::new(database, TableHistoryService::new(), TableLockService::new())
            .with_options(options),
    )
}

pub(crate) async fn load_changelog(path: &std::path::Path) -> CliResult<ChangeLog> {
    Ok(ChangeLog::load(path).await?)
}
