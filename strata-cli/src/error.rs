//! CLI error types and result alias.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// IO error.
    #[error("IO error: {0}")]
    #[diagnostic(code(strata::io))]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    #[diagnostic(code(strata::config))]
    Config(String),

    /// Changelog validation failed.
    #[error("Validation failed:\n{0}")]
    #[diagnostic(code(strata::validation))]
    Validation(String),

    /// The change log lock is held elsewhere.
    #[error("{0}")]
    #[diagnostic(
        code(strata::locked),
        help("another process is migrating this database; retry later or run `strata release-locks`")
    )]
    Locked(String),

    /// Migration failed.
    #[error("Migration error: {0}")]
    #[diagnostic(code(strata::migration))]
    Migration(String),

    /// Database connection error.
    #[error("Database error: {0}")]
    #[diagnostic(code(strata::database))]
    Database(String),

    /// Command usage error.
    #[error("Command error: {0}")]
    #[diagnostic(code(strata::command))]
    Command(String),
}

impl From<strata_core::MigrationError> for CliError {
    fn from(err: strata_core::MigrationError) -> Self {
        use strata_core::MigrationError as E;
        match err {
            E::Validation(errors) => CliError::Validation(errors.to_string()),
            E::LockUnavailable(message) => CliError::Locked(message),
            E::Database(message) => CliError::Database(message),
            other => CliError::Migration(other.to_string()),
        }
    }
}

impl From<toml::de::Error> for CliError {
    fn from(err: toml::de::Error) -> Self {
        CliError::Config(format!("Failed to parse TOML: {err}"))
    }
}
