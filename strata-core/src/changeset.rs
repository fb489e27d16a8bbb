//! Change sets: the unit of idempotent application.

use crate::change::{Change, RollbackSupport};
use crate::checksum::Checksum;
use crate::database::{Database, QuotingStrategy};
use crate::filter::FilterExpression;
use crate::generator::GeneratorRegistry;
use crate::precondition::Precondition;

/// The identity of a change set: unique within a changelog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeSetId {
    /// Author-chosen id.
    pub id: String,
    /// Author name.
    pub author: String,
    /// Logical path of the changelog file that declared it.
    pub file: String,
}

impl ChangeSetId {
    /// Create an identity.
    pub fn new(
        id: impl Into<String>,
        author: impl Into<String>,
        file: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            file: file.into(),
        }
    }
}

impl std::fmt::Display for ChangeSetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}::{}", self.file, self.id, self.author)
    }
}

/// A named, ordered group of changes applied and tracked as one unit.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    /// Identity tuple.
    pub identity: ChangeSetId,
    /// Forward changes, in order.
    pub changes: Vec<Change>,
    /// Explicit rollback override. `Some(vec![])` declares a deliberate
    /// no-op rollback; `None` derives inverses from the forward changes.
    pub rollback: Option<Vec<Change>>,
    /// Preconditions gating execution.
    pub preconditions: Vec<Precondition>,
    /// Execute on every run, even when already recorded.
    pub run_always: bool,
    /// Re-execute when the checksum changes instead of failing validation.
    pub run_on_change: bool,
    /// Whether a statement failure fails the run. When false the failure is
    /// recorded and the run continues.
    pub fail_on_error: bool,
    /// Context expression.
    pub context: FilterExpression,
    /// Label expression.
    pub labels: FilterExpression,
    /// Database filter, e.g. `"postgresql, mysql"` or `"!sqlite"`.
    pub dbms: String,
    /// Quoting strategy for this change set only; the executor restores the
    /// default afterwards.
    pub quoting: Option<QuotingStrategy>,
    /// Author comment. Excluded from the checksum.
    pub comment: Option<String>,
}

impl ChangeSet {
    /// Create an empty change set.
    pub fn new(
        id: impl Into<String>,
        author: impl Into<String>,
        file: impl Into<String>,
    ) -> Self {
        Self {
            identity: ChangeSetId::new(id, author, file),
            changes: Vec::new(),
            rollback: None,
            preconditions: Vec::new(),
            run_always: false,
            run_on_change: false,
            fail_on_error: true,
            context: FilterExpression::always(),
            labels: FilterExpression::always(),
            dbms: String::new(),
            quoting: None,
            comment: None,
        }
    }

    /// Append a forward change.
    pub fn change(mut self, change: Change) -> Self {
        self.changes.push(change);
        self
    }

    /// Append an explicit rollback change.
    pub fn rollback_change(mut self, change: Change) -> Self {
        self.rollback.get_or_insert_with(Vec::new).push(change);
        self
    }

    /// Declare a deliberate no-op rollback.
    pub fn empty_rollback(mut self) -> Self {
        self.rollback = Some(Vec::new());
        self
    }

    /// Add a precondition.
    pub fn precondition(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    /// Set the context expression.
    pub fn with_context(mut self, context: FilterExpression) -> Self {
        self.context = context;
        self
    }

    /// Set the label expression.
    pub fn with_labels(mut self, labels: FilterExpression) -> Self {
        self.labels = labels;
        self
    }

    /// Set the dbms filter.
    pub fn with_dbms(mut self, dbms: impl Into<String>) -> Self {
        self.dbms = dbms.into();
        self
    }

    /// Set the quoting strategy for this change set.
    pub fn with_quoting(mut self, quoting: QuotingStrategy) -> Self {
        self.quoting = Some(quoting);
        self
    }

    /// Mark run-always.
    pub fn run_always(mut self, run_always: bool) -> Self {
        self.run_always = run_always;
        self
    }

    /// Mark run-on-change.
    pub fn run_on_change(mut self, run_on_change: bool) -> Self {
        self.run_on_change = run_on_change;
        self
    }

    /// Set whether a statement failure fails the run.
    pub fn fail_on_error(mut self, fail_on_error: bool) -> Self {
        self.fail_on_error = fail_on_error;
        self
    }

    /// Set the comment.
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Human description: the contained change kinds.
    pub fn description(&self) -> String {
        if self.changes.is_empty() {
            "empty".to_string()
        } else {
            self.changes
                .iter()
                .map(Change::description)
                .collect::<Vec<_>>()
                .join("; ")
        }
    }

    /// The checksum of this change set's executable content, computed with
    /// the current algorithm version.
    ///
    /// The domain is the forward changes and any explicit rollback changes.
    /// Comments and run filters are excluded: they change whether the set
    /// runs, not what it does.
    pub fn checksum(&self) -> Checksum {
        Checksum::compute(&self.checksum_content())
    }

    /// The checksum under a specific algorithm version. Used when
    /// revalidating ledger rows written by older releases.
    pub fn checksum_versioned(&self, version: u8) -> Checksum {
        Checksum::compute_versioned(version, &self.checksum_content())
    }

    fn checksum_content(&self) -> String {
        let mut content = String::new();
        for change in &self.changes {
            content.push_str(&change.checksum_component());
            content.push('\n');
        }
        if let Some(rollback) = &self.rollback {
            content.push_str("rollback:\n");
            for change in rollback {
                content.push_str(&change.checksum_component());
                content.push('\n');
            }
        }
        content
    }

    /// The changes that roll this set back: the explicit override if
    /// declared, otherwise the inverses of the forward changes in reverse
    /// order. Any non-invertible change without an override makes the whole
    /// set non-rollbackable.
    pub fn rollback_changes(&self) -> RollbackSupport {
        if let Some(explicit) = &self.rollback {
            return RollbackSupport::Supported(explicit.clone());
        }

        let mut inverses = Vec::new();
        for change in self.changes.iter().rev() {
            match change.create_inverses() {
                RollbackSupport::Supported(changes) => inverses.extend(changes),
                unsupported @ RollbackSupport::Unsupported(_) => return unsupported,
            }
        }
        RollbackSupport::Supported(inverses)
    }

    /// Validate every change against the target database and generator
    /// registry, returning all problems found.
    pub fn validate(&self, database: &Database, registry: &GeneratorRegistry) -> Vec<String> {
        let mut issues = Vec::new();

        for change in &self.changes {
            issues.extend(change.validate(database));

            match change.generate_statements(database) {
                Ok(statements) => {
                    for statement in statements {
                        if let Err(unsupported) = registry.validate(&statement, database) {
                            issues.push(unsupported.to_string());
                        }
                    }
                }
                Err(error) => issues.push(error.to_string()),
            }
        }

        issues
    }
}
