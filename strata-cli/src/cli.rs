//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// strata - database schema migrations
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(version)]
#[command(about = "strata - database schema migrations", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply pending change sets
    Update(UpdateArgs),

    /// Roll back applied change sets by tag, count, or date
    Rollback(RollbackArgs),

    /// Show pending and unexpected change sets
    Status(ChangelogArgs),

    /// Validate the changelog against the database without executing
    Validate(ChangelogArgs),

    /// Tag the most recently applied change set as a rollback anchor
    Tag(TagArgs),

    /// Mark all unran change sets as applied without executing them
    ChangelogSync(ChangelogArgs),

    /// Null out stored checksums so the next run revalidates
    ClearChecksums(ConnectionOnlyArgs),

    /// List change log lock holders
    ListLocks(ConnectionOnlyArgs),

    /// Force-release the change log lock
    ReleaseLocks(ConnectionOnlyArgs),

    /// Drop every table in the default schema
    DropAll(DropAllArgs),
}

// =============================================================================
// Shared argument groups
// =============================================================================

/// Database connection arguments
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Database connection URL
    #[arg(long, env = "STRATA_URL")]
    pub url: Option<String>,

    /// Database username
    #[arg(long, short = 'u', env = "STRATA_USERNAME")]
    pub username: Option<String>,

    /// Database password
    #[arg(long, short = 'p', env = "STRATA_PASSWORD")]
    pub password: Option<String>,
}

/// Connection plus changelog arguments
#[derive(Args, Debug, Clone)]
pub struct ChangelogArgs {
    /// Path to the root changelog file
    #[arg(long, env = "STRATA_CHANGELOG_FILE")]
    pub changelog_file: Option<PathBuf>,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Active contexts, comma separated
    #[arg(long, value_delimiter = ',')]
    pub contexts: Vec<String>,

    /// Active labels, comma separated
    #[arg(long, value_delimiter = ',')]
    pub labels: Vec<String>,
}

/// Connection-only commands
#[derive(Args, Debug, Clone)]
pub struct ConnectionOnlyArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

// =============================================================================
// Update
// =============================================================================

/// Arguments for the `update` command
#[derive(Args, Debug)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub changelog: ChangelogArgs,

    /// Print the SQL instead of executing it
    #[arg(long)]
    pub dry_run: bool,
}

// =============================================================================
// Rollback
// =============================================================================

/// Arguments for the `rollback` command
#[derive(Args, Debug)]
pub struct RollbackArgs {
    #[command(flatten)]
    pub changelog: ChangelogArgs,

    /// Roll back everything applied after this tag
    #[arg(long, group = "target")]
    pub tag: Option<String>,

    /// Roll back the last N applied change sets
    #[arg(long, group = "target")]
    pub count: Option<usize>,

    /// Roll back everything applied after this instant (RFC 3339)
    #[arg(long, group = "target")]
    pub to_date: Option<String>,

    /// Print the SQL instead of executing it
    #[arg(long)]
    pub dry_run: bool,
}

// =============================================================================
// Tag
// =============================================================================

/// Arguments for the `tag` command
#[derive(Args, Debug)]
pub struct TagArgs {
    /// The tag to write
    pub tag: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

// =============================================================================
// Drop all
// =============================================================================

/// Arguments for the `drop-all` command
#[derive(Args, Debug)]
pub struct DropAllArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_structure_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_rollback_targets_are_exclusive() {
        let result = Cli::try_parse_from([
            "strata",
            "rollback",
            "--tag",
            "v1",
            "--count",
            "2",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_contexts_split_on_commas() {
        let cli = Cli::try_parse_from([
            "strata",
            "update",
            "--changelog-file",
            "db/changelog.toml",
            "--url",
            "postgres://localhost/app",
            "--contexts",
            "prod,eu",
        ])
        .unwrap();

        match cli.command {
            Command::Update(args) => {
                assert_eq!(args.changelog.contexts, vec!["prod", "eu"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
