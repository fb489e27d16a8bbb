//! Preconditions: runtime checks gating change set execution.
//!
//! Each precondition carries the policy chosen by the changelog author for
//! the failing case; the executor honors that policy rather than a single
//! hardcoded behavior.

use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::MigrateResult;

/// What to do when a precondition fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailAction {
    /// Abort the entire run.
    #[default]
    Halt,
    /// Log a warning and execute the change set anyway.
    Warn,
    /// Skip the change set without writing a ledger row.
    Skip,
    /// Skip the change set and record it as ran.
    MarkRan,
}

/// The check a precondition performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "camelCase")]
pub enum PreconditionCheck {
    /// The table exists.
    TableExists {
        /// Table name.
        table: String,
    },
    /// The column exists on the table.
    ColumnExists {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// A scalar query returns the expected value (compared as text).
    SqlCheck {
        /// The query; its first column of its first row is compared.
        sql: String,
        /// Expected value.
        expected: String,
    },
}

/// A runtime check plus its failure policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Precondition {
    /// The check to perform.
    #[serde(flatten)]
    pub check: PreconditionCheck,
    /// Invert the check, e.g. "table does not exist".
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub negate: bool,
    /// Policy applied when the check fails.
    #[serde(default)]
    pub on_fail: FailAction,
}

impl Precondition {
    /// Create a table-exists precondition with the default HALT policy.
    pub fn table_exists(table: impl Into<String>) -> Self {
        Self {
            check: PreconditionCheck::TableExists {
                table: table.into(),
            },
            negate: false,
            on_fail: FailAction::default(),
        }
    }

    /// Create a column-exists precondition with the default HALT policy.
    pub fn column_exists(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            check: PreconditionCheck::ColumnExists {
                table: table.into(),
                column: column.into(),
            },
            negate: false,
            on_fail: FailAction::default(),
        }
    }

    /// Invert the check.
    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    /// Set the failure policy.
    pub fn on_fail(mut self, action: FailAction) -> Self {
        self.on_fail = action;
        self
    }

    /// Evaluate against the target database. `Ok(true)` means the
    /// precondition holds.
    pub async fn evaluate(&self, database: &mut Database) -> MigrateResult<bool> {
        let holds = match &self.check {
            PreconditionCheck::TableExists { table } => database.table_exists(table).await?,
            PreconditionCheck::ColumnExists { table, column } => {
                database.column_exists(table, column).await?
            }
            PreconditionCheck::SqlCheck { sql, expected } => {
                let rows = database.query(sql).await?;
                let actual = rows.first().and_then(|row| {
                    row.first().map(|value| match value {
                        crate::database::SqlValue::Text(s) => s.clone(),
                        crate::database::SqlValue::Int(n) => n.to_string(),
                        crate::database::SqlValue::Bool(b) => b.to_string(),
                        other => format!("{other:?}"),
                    })
                });
                actual.as_deref() == Some(expected.as_str())
            }
        };

        Ok(holds != self.negate)
    }

    /// Describe the check for skip reasons and error messages.
    pub fn describe(&self) -> String {
        let base = match &self.check {
            PreconditionCheck::TableExists { table } => format!("table '{table}' exists"),
            PreconditionCheck::ColumnExists { table, column } => {
                format!("column '{table}.{column}' exists")
            }
            PreconditionCheck::SqlCheck { sql, expected } => {
                format!("query `{sql}` returns '{expected}'")
            }
        };
        if self.negate {
            format!("not ({base})")
        } else {
            base
        }
    }
}
