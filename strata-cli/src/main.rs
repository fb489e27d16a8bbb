//! strata - command-line interface for the migration engine.

use clap::Parser;

use strata_cli::cli::{Cli, Command};
use strata_cli::commands;
use strata_cli::error::CliResult;
use strata_cli::output;

#[tokio::main]
async fn main() {
    // Honor RUST_LOG for engine tracing; quiet by default.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init();

    if let Err(e) = run().await {
        output::newline();
        output::error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Update(args) => commands::update::run(args).await,
        Command::Rollback(args) => commands::rollback::run(args).await,
        Command::Status(args) => commands::status::run(args).await,
        Command::Validate(args) => commands::validate::run(args).await,
        Command::Tag(args) => commands::tag::run(args).await,
        Command::ChangelogSync(args) => commands::sync::run(args).await,
        Command::ClearChecksums(args) => commands::checksums::run(args).await,
        Command::ListLocks(args) => commands::locks::run_list(args).await,
        Command::ReleaseLocks(args) => commands::locks::run_release(args).await,
        Command::DropAll(args) => commands::drop_all::run(args).await,
    }
}
