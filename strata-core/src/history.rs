//! The run-tracking ledger.
//!
//! The history service records, per applied change set: checksum, execution
//! timestamp, order, and status. The SQL-backed implementation bootstraps
//! its own table lazily on first use; the table's creation is not tracked
//! in itself. [`MemoryHistoryService`] backs tests and offline planning.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, info};

use crate::changeset::{ChangeSet, ChangeSetId};
use crate::checksum::Checksum;
use crate::database::{Database, Row, SqlValue};
use crate::error::{MigrateResult, MigrationError};
use crate::generator::{AnsiGenerator, SqlGenerator};
use crate::statement::{ColumnDef, ColumnType, Statement};

/// Default name of the ledger table.
pub const DEFAULT_HISTORY_TABLE: &str = "strata_changelog";

/// How a ledger row came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecType {
    /// Executed for the first time.
    Executed,
    /// Re-executed (run-always, or run-on-change with changed content).
    Reran,
    /// Execution failed but the change set was declared fail_on_error=false.
    Failed,
    /// Skipped by a filter or precondition; not persisted as ran.
    Skipped,
    /// Recorded as ran without executing.
    MarkRan,
}

impl ExecType {
    /// The ledger spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Executed => "EXECUTED",
            Self::Reran => "RERAN",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
            Self::MarkRan => "MARK_RAN",
        }
    }

    /// Parse the ledger spelling.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "EXECUTED" => Some(Self::Executed),
            "RERAN" => Some(Self::Reran),
            "FAILED" => Some(Self::Failed),
            "SKIPPED" => Some(Self::Skipped),
            "MARK_RAN" => Some(Self::MarkRan),
            _ => None,
        }
    }

    /// Whether a row with this type counts as applied.
    pub fn ran(self) -> bool {
        matches!(self, Self::Executed | Self::Reran | Self::MarkRan)
    }
}

/// One ledger row.
#[derive(Debug, Clone)]
pub struct RanChangeSet {
    /// Change set id.
    pub id: String,
    /// Change set author.
    pub author: String,
    /// Logical changelog path.
    pub filename: String,
    /// Stored checksum, if not cleared.
    pub checksum: Option<Checksum>,
    /// When it was applied.
    pub date_executed: DateTime<Utc>,
    /// Application order; strictly increasing, defines rollback order.
    pub order_executed: i64,
    /// How the row came to exist.
    pub exec_type: ExecType,
    /// Rollback anchor, if tagged.
    pub tag: Option<String>,
    /// Change descriptions at execution time.
    pub description: Option<String>,
    /// Author comment at execution time.
    pub comments: Option<String>,
    /// Identifier shared by all rows of one run.
    pub deployment_id: Option<String>,
}

impl RanChangeSet {
    /// The identity tuple of this row.
    pub fn identity(&self) -> ChangeSetId {
        ChangeSetId::new(&self.id, &self.author, &self.filename)
    }

    /// Whether this row records the given change set.
    pub fn matches(&self, change_set: &ChangeSet) -> bool {
        self.id == change_set.identity.id
            && self.author == change_set.identity.author
            && self.filename == change_set.identity.file
    }
}

/// The ledger contract.
#[async_trait]
pub trait HistoryService: Send {
    /// Create or verify the ledger storage. Idempotent; called before any
    /// change set executes.
    async fn init(&mut self, database: &mut Database) -> MigrateResult<()>;

    /// All ledger rows in application order.
    async fn ran_change_sets(&mut self, database: &mut Database)
    -> MigrateResult<Vec<RanChangeSet>>;

    /// Record a change set outcome. Inserts a new row for first executions
    /// and updates the existing row for reruns.
    async fn mark_exec_status(
        &mut self,
        database: &mut Database,
        change_set: &ChangeSet,
        exec_type: ExecType,
    ) -> MigrateResult<()>;

    /// Refresh the stored checksum of an already-ran change set without
    /// re-executing it. Used after checksums are cleared.
    async fn update_checksum(
        &mut self,
        database: &mut Database,
        change_set: &ChangeSet,
    ) -> MigrateResult<()>;

    /// Delete the ledger row for a change set (after rollback).
    async fn remove_ran_status(
        &mut self,
        database: &mut Database,
        change_set: &ChangeSetId,
    ) -> MigrateResult<()>;

    /// Write a tag onto the most recently applied row.
    async fn tag(&mut self, database: &mut Database, label: &str) -> MigrateResult<()>;

    /// Whether any row carries the tag.
    async fn tag_exists(&mut self, database: &mut Database, label: &str) -> MigrateResult<bool>;

    /// Null out every stored checksum so the next run revalidates.
    async fn clear_checksums(&mut self, database: &mut Database) -> MigrateResult<()>;
}

/// SQL-backed ledger in the target database.
pub struct TableHistoryService {
    table: String,
    initialized: bool,
    deployment_id: Option<String>,
}

impl TableHistoryService {
    /// Create a service over the default table name.
    pub fn new() -> Self {
        Self::with_table(DEFAULT_HISTORY_TABLE)
    }

    /// Create a service over a custom table name.
    pub fn with_table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            initialized: false,
            deployment_id: None,
        }
    }

    /// The ledger table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The identifier shared by all rows written in this run.
    fn deployment_id(&mut self) -> String {
        self.deployment_id
            .get_or_insert_with(|| {
                let millis = Utc::now().timestamp_millis().to_string();
                millis[millis.len().saturating_sub(10)..].to_string()
            })
            .clone()
    }

    fn ledger_columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("id", ColumnType::VarChar(255)).not_null(),
            ColumnDef::new("author", ColumnType::VarChar(255)).not_null(),
            ColumnDef::new("filename", ColumnType::VarChar(255)).not_null(),
            ColumnDef::new("dateexecuted", ColumnType::Timestamp).not_null(),
            ColumnDef::new("orderexecuted", ColumnType::Integer).not_null(),
            ColumnDef::new("exectype", ColumnType::VarChar(10)).not_null(),
            ColumnDef::new("checksum", ColumnType::VarChar(100)),
            ColumnDef::new("description", ColumnType::VarChar(255)),
            ColumnDef::new("comments", ColumnType::VarChar(255)),
            ColumnDef::new("tag", ColumnType::VarChar(255)),
            ColumnDef::new("deployment_id", ColumnType::VarChar(10)),
        ]
    }

    async fn next_order(&mut self, database: &mut Database) -> MigrateResult<i64> {
        let table = database.quote(&self.table);
        let rows = database
            .query(&format!("SELECT MAX(orderexecuted) AS maxorder FROM {table}"))
            .await?;
        let max = rows
            .first()
            .and_then(|row| row.first())
            .and_then(SqlValue::as_i64)
            .unwrap_or(0);
        Ok(max + 1)
    }

    async fn find_row(
        &mut self,
        database: &mut Database,
        identity: &ChangeSetId,
    ) -> MigrateResult<Option<RanChangeSet>> {
        let rows = self.ran_change_sets(database).await?;
        Ok(rows
            .into_iter()
            .find(|row| row.identity() == *identity))
    }

    fn identity_predicate(&self, database: &Database, identity: &ChangeSetId) -> String {
        format!(
            "id = {} AND author = {} AND filename = {}",
            database.escape_string_literal(&identity.id),
            database.escape_string_literal(&identity.author),
            database.escape_string_literal(&identity.file)
        )
    }
}

impl Default for TableHistoryService {
    fn default() -> Self {
        Self::new()
    }
}

fn timestamp_literal(now: DateTime<Utc>) -> String {
    format!("'{}'", now.format("%Y-%m-%d %H:%M:%S"))
}

pub(crate) fn parse_row_timestamp(value: Option<&SqlValue>) -> DateTime<Utc> {
    match value {
        Some(SqlValue::Timestamp(ts)) => *ts,
        Some(SqlValue::Text(raw)) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .map(|naive| naive.and_utc())
            .unwrap_or_else(|_| Utc::now()),
        _ => Utc::now(),
    }
}

#[async_trait]
impl HistoryService for TableHistoryService {
    async fn init(&mut self, database: &mut Database) -> MigrateResult<()> {
        if self.initialized {
            return Ok(());
        }

        if !database.table_exists(&self.table).await? {
            info!(table = %self.table, "creating change log table");
            let statement = Statement::CreateTable {
                schema: None,
                table: self.table.clone(),
                columns: Self::ledger_columns(),
            };
            for sql in AnsiGenerator.generate(&statement, database)? {
                database.execute(&sql).await?;
            }
            database.commit().await?;
        } else if !database.column_exists(&self.table, "checksum").await? {
            return Err(MigrationError::database(format!(
                "table '{}' exists but is missing the checksum column",
                self.table
            )));
        }

        self.initialized = true;
        Ok(())
    }

    async fn ran_change_sets(
        &mut self,
        database: &mut Database,
    ) -> MigrateResult<Vec<RanChangeSet>> {
        let table = database.quote(&self.table);
        let rows = database
            .query(&format!(
                "SELECT id, author, filename, dateexecuted, orderexecuted, exectype, \
                 checksum, description, comments, tag, deployment_id \
                 FROM {table} ORDER BY orderexecuted"
            ))
            .await?;

        let mut ran = Vec::with_capacity(rows.len());
        for row in rows {
            ran.push(parse_ran_row(&row)?);
        }
        Ok(ran)
    }

    async fn mark_exec_status(
        &mut self,
        database: &mut Database,
        change_set: &ChangeSet,
        exec_type: ExecType,
    ) -> MigrateResult<()> {
        let order = self.next_order(database).await?;
        let table = database.quote(&self.table);
        let checksum = change_set.checksum().to_string();
        let deployment_id = self.deployment_id();
        let existing = self.find_row(database, &change_set.identity).await?;

        debug!(
            change_set = %change_set.identity,
            exec_type = exec_type.as_str(),
            order,
            "recording run status"
        );

        let sql = match existing {
            Some(_) => format!(
                "UPDATE {table} SET dateexecuted = {}, orderexecuted = {order}, \
                 exectype = {}, checksum = {}, deployment_id = {} WHERE {}",
                timestamp_literal(Utc::now()),
                database.escape_string_literal(exec_type.as_str()),
                database.escape_string_literal(&checksum),
                database.escape_string_literal(&deployment_id),
                self.identity_predicate(database, &change_set.identity)
            ),
            None => format!(
                "INSERT INTO {table} (id, author, filename, dateexecuted, orderexecuted, \
                 exectype, checksum, description, comments, tag, deployment_id) \
                 VALUES ({}, {}, {}, {}, {order}, {}, {}, {}, {}, NULL, {})",
                database.escape_string_literal(&change_set.identity.id),
                database.escape_string_literal(&change_set.identity.author),
                database.escape_string_literal(&change_set.identity.file),
                timestamp_literal(Utc::now()),
                database.escape_string_literal(exec_type.as_str()),
                database.escape_string_literal(&checksum),
                database.escape_string_literal(&change_set.description()),
                match &change_set.comment {
                    Some(comment) => database.escape_string_literal(comment),
                    None => "NULL".to_string(),
                },
                database.escape_string_literal(&deployment_id),
            ),
        };

        database.execute(&sql).await?;
        Ok(())
    }

    async fn update_checksum(
        &mut self,
        database: &mut Database,
        change_set: &ChangeSet,
    ) -> MigrateResult<()> {
        let table = database.quote(&self.table);
        let checksum = change_set.checksum().to_string();
        let sql = format!(
            "UPDATE {table} SET checksum = {} WHERE {}",
            database.escape_string_literal(&checksum),
            self.identity_predicate(database, &change_set.identity)
        );
        database.execute(&sql).await?;
        Ok(())
    }

    async fn remove_ran_status(
        &mut self,
        database: &mut Database,
        identity: &ChangeSetId,
    ) -> MigrateResult<()> {
        let table = database.quote(&self.table);
        let sql = format!(
            "DELETE FROM {table} WHERE {}",
            self.identity_predicate(database, identity)
        );
        database.execute(&sql).await?;
        Ok(())
    }

    async fn tag(&mut self, database: &mut Database, label: &str) -> MigrateResult<()> {
        let order = self.next_order(database).await? - 1;
        if order < 1 {
            return Err(MigrationError::other(
                "cannot tag: the change log table is empty",
            ));
        }
        let table = database.quote(&self.table);
        let sql = format!(
            "UPDATE {table} SET tag = {} WHERE orderexecuted = {order}",
            database.escape_string_literal(label)
        );
        database.execute(&sql).await?;
        Ok(())
    }

    async fn tag_exists(&mut self, database: &mut Database, label: &str) -> MigrateResult<bool> {
        let table = database.quote(&self.table);
        let rows = database
            .query(&format!(
                "SELECT COUNT(*) AS tagcount FROM {table} WHERE tag = {}",
                database.escape_string_literal(label)
            ))
            .await?;
        Ok(rows
            .first()
            .and_then(|row| row.first())
            .and_then(SqlValue::as_i64)
            .unwrap_or(0)
            > 0)
    }

    async fn clear_checksums(&mut self, database: &mut Database) -> MigrateResult<()> {
        let table = database.quote(&self.table);
        database
            .execute(&format!("UPDATE {table} SET checksum = NULL"))
            .await?;
        Ok(())
    }
}

fn parse_ran_row(row: &Row) -> MigrateResult<RanChangeSet> {
    let required = |column: &str| -> MigrateResult<String> {
        row.get_str(column)
            .map(str::to_string)
            .ok_or_else(|| MigrationError::database(format!("ledger row is missing '{column}'")))
    };

    let exec_type_raw = required("exectype")?;
    let exec_type = ExecType::parse(&exec_type_raw).ok_or_else(|| {
        MigrationError::database(format!("unknown exec type '{exec_type_raw}' in ledger"))
    })?;

    let checksum = match row.get_str("checksum") {
        Some(raw) if !raw.is_empty() => Some(raw.parse::<Checksum>()?),
        _ => None,
    };

    Ok(RanChangeSet {
        id: required("id")?,
        author: required("author")?,
        filename: required("filename")?,
        checksum,
        date_executed: parse_row_timestamp(row.get("dateexecuted")),
        order_executed: row.get_i64("orderexecuted").ok_or_else(|| {
            MigrationError::database("ledger row is missing 'orderexecuted'")
        })?,
        exec_type,
        tag: row.get_str("tag").map(str::to_string),
        description: row.get_str("description").map(str::to_string),
        comments: row.get_str("comments").map(str::to_string),
        deployment_id: row.get_str("deployment_id").map(str::to_string),
    })
}

/// In-memory ledger for tests and offline planning.
#[derive(Debug, Default)]
pub struct MemoryHistoryService {
    rows: Vec<RanChangeSet>,
    next_order: i64,
}

impl MemoryHistoryService {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            next_order: 1,
        }
    }

    /// Direct access to the rows, for assertions.
    pub fn rows(&self) -> &[RanChangeSet] {
        &self.rows
    }

    /// Seed a pre-existing row, e.g. one written by an older release.
    pub fn seed(&mut self, row: RanChangeSet) {
        self.next_order = self.next_order.max(row.order_executed + 1);
        self.rows.push(row);
    }
}

#[async_trait]
impl HistoryService for MemoryHistoryService {
    async fn init(&mut self, _database: &mut Database) -> MigrateResult<()> {
        Ok(())
    }

    async fn ran_change_sets(
        &mut self,
        _database: &mut Database,
    ) -> MigrateResult<Vec<RanChangeSet>> {
        let mut rows = self.rows.clone();
        rows.sort_by_key(|row| row.order_executed);
        Ok(rows)
    }

    async fn mark_exec_status(
        &mut self,
        _database: &mut Database,
        change_set: &ChangeSet,
        exec_type: ExecType,
    ) -> MigrateResult<()> {
        let order = self.next_order;
        self.next_order += 1;

        let row = RanChangeSet {
            id: change_set.identity.id.clone(),
            author: change_set.identity.author.clone(),
            filename: change_set.identity.file.clone(),
            checksum: Some(change_set.checksum()),
            date_executed: Utc::now(),
            order_executed: order,
            exec_type,
            tag: None,
            description: Some(change_set.description()),
            comments: change_set.comment.clone(),
            deployment_id: None,
        };

        if let Some(existing) = self.rows.iter_mut().find(|r| r.matches(change_set)) {
            *existing = row;
        } else {
            self.rows.push(row);
        }
        Ok(())
    }

    async fn update_checksum(
        &mut self,
        _database: &mut Database,
        change_set: &ChangeSet,
    ) -> MigrateResult<()> {
        if let Some(existing) = self.rows.iter_mut().find(|r| r.matches(change_set)) {
            existing.checksum = Some(change_set.checksum());
        }
        Ok(())
    }

    async fn remove_ran_status(
        &mut self,
        _database: &mut Database,
        identity: &ChangeSetId,
    ) -> MigrateResult<()> {
        self.rows.retain(|row| row.identity() != *identity);
        Ok(())
    }

    async fn tag(&mut self, _database: &mut Database, label: &str) -> MigrateResult<()> {
        match self.rows.iter_mut().max_by_key(|row| row.order_executed) {
            Some(row) => {
                row.tag = Some(label.to_string());
                Ok(())
            }
            None => Err(MigrationError::other(
                "cannot tag: the change log table is empty",
            )),
        }
    }

    async fn tag_exists(&mut self, _database: &mut Database, label: &str) -> MigrateResult<bool> {
        Ok(self.rows.iter().any(|row| row.tag.as_deref() == Some(label)))
    }

    async fn clear_checksums(&mut self, _database: &mut Database) -> MigrateResult<()> {
        for row in &mut self.rows {
            row.checksum = None;
        }
        Ok(())
    }
}
