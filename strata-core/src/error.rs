//! Error types for the migration engine.

use thiserror::Error;

use crate::changeset::ChangeSetId;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database operation error.
    #[error("Database error: {0}")]
    Database(String),

    /// Changelog file could not be parsed.
    #[error("Failed to parse changelog '{file}': {message}")]
    Parse {
        /// Path of the offending changelog file.
        file: String,
        /// Parser diagnostic.
        message: String,
    },

    /// One or more validation failures, collected before execution.
    #[error("{0}")]
    Validation(ValidationErrors),

    /// A precondition with on-fail policy HALT failed.
    #[error("Precondition halted run at change set {change_set}: {message}")]
    PreconditionHalt {
        /// Identity of the gated change set.
        change_set: ChangeSetId,
        /// What the precondition observed.
        message: String,
    },

    /// A statement failed while executing a change set. The run halts; the
    /// partially applied change set is not compensated.
    #[error("Migration failed at change set {change_set}: {message}")]
    Execution {
        /// Identity of the failing change set.
        change_set: ChangeSetId,
        /// Driver/database diagnostic.
        message: String,
    },

    /// A requested rollback boundary requires inverting a change that has no
    /// viable inverse. Raised before any statement executes.
    #[error("Cannot roll back past change set {change_set}: {reason}")]
    RollbackImpossible {
        /// Identity of the non-invertible change set.
        change_set: ChangeSetId,
        /// Why no inverse exists.
        reason: String,
    },

    /// The migration lock could not be acquired. Distinguishable from a
    /// failed migration so callers can decide whether retrying makes sense.
    #[error("Could not acquire change log lock: {0}")]
    LockUnavailable(String),

    /// A change or statement is not supported on the target database.
    #[error(transparent)]
    Unsupported(#[from] UnsupportedError),

    /// No ran change set matches the requested rollback target.
    #[error("Rollback target not found: {0}")]
    RollbackTargetNotFound(String),

    /// General migration error.
    #[error("Migration error: {0}")]
    Other(String),
}

impl MigrationError {
    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a parse error.
    pub fn parse(file: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            message: msg.into(),
        }
    }

    /// Create an execution error for a change set.
    pub fn execution(change_set: ChangeSetId, msg: impl Into<String>) -> Self {
        Self::Execution {
            change_set,
            message: msg.into(),
        }
    }

    /// Create a lock-unavailable error.
    pub fn lock_unavailable(msg: impl Into<String>) -> Self {
        Self::LockUnavailable(msg.into())
    }

    /// Create an other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether this error means the lock was held elsewhere, as opposed to
    /// the migration itself failing.
    pub fn is_lock_unavailable(&self) -> bool {
        matches!(self, Self::LockUnavailable(_))
    }
}

/// A statement or change rejected by the target dialect.
///
/// Raised at validation time, never discovered by silently dropping the
/// operation at generation time.
#[derive(Debug, Clone, Error)]
#[error("{operation} is not supported on {database}")]
pub struct UnsupportedError {
    /// The rejected operation, e.g. `"autoIncrement"` or `"createSequence"`.
    pub operation: String,
    /// Short name of the target database.
    pub database: String,
}

impl UnsupportedError {
    /// Create a new unsupported-operation error.
    pub fn new(operation: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            database: database.into(),
        }
    }
}

/// A batch of validation failures, reported together rather than failing on
/// the first one found.
#[derive(Debug, Clone, Default)]
pub struct ValidationErrors {
    issues: Vec<ValidationIssue>,
}

impl ValidationErrors {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an issue.
    pub fn push(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    /// Record an issue against a specific change set.
    pub fn push_for(&mut self, change_set: ChangeSetId, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            change_set: Some(change_set),
            message: message.into(),
        });
    }

    /// All collected issues.
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    /// Whether no issues were collected.
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Number of collected issues.
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// Convert into a `MigrationError` if any issue was collected.
    pub fn into_result(self) -> MigrateResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(MigrationError::Validation(self))
        }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} validation error(s):", self.issues.len())?;
        for issue in &self.issues {
            match &issue.change_set {
                Some(id) => writeln!(f, "  {}: {}", id, issue.message)?,
                None => writeln!(f, "  {}", issue.message)?,
            }
        }
        Ok(())
    }
}

/// A single validation failure with enough context to locate the offending
/// declaration.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Identity of the change set the issue concerns, if any.
    pub change_set: Option<ChangeSetId>,
    /// Human-readable description.
    pub message: String,
}

impl ValidationIssue {
    /// Create an issue not tied to a particular change set.
    pub fn general(message: impl Into<String>) -> Self {
        Self {
            change_set: None,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> ChangeSetId {
        ChangeSetId::new("1", "alice", "db/changelog.toml")
    }

    #[test]
    fn test_execution_error_keeps_identity() {
        let err = MigrationError::execution(id(), "syntax error");
        let msg = err.to_string();
        assert!(msg.contains('1'));
        assert!(msg.contains("alice"));
        assert!(msg.contains("db/changelog.toml"));
    }

    #[test]
    fn test_lock_unavailable_is_distinguishable() {
        let lock = MigrationError::lock_unavailable("held by host-2");
        let exec = MigrationError::execution(id(), "boom");
        assert!(lock.is_lock_unavailable());
        assert!(!exec.is_lock_unavailable());
    }

    #[test]
    fn test_validation_errors_collect() {
        let mut errors = ValidationErrors::new();
        assert!(errors.clone().into_result().is_ok());

        errors.push_for(id(), "duplicate identity");
        errors.push(ValidationIssue::general("changelog is empty"));
        assert_eq!(errors.len(), 2);

        let err = errors.into_result().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("2 validation error(s)"));
        assert!(msg.contains("duplicate identity"));
        assert!(msg.contains("changelog is empty"));
    }

    #[test]
    fn test_unsupported_display() {
        let err = UnsupportedError::new("createSequence", "mysql");
        assert_eq!(err.to_string(), "createSequence is not supported on mysql");
    }
}
