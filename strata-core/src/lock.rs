//! The change log lock: mutual exclusion across processes.
//!
//! Acquisition is a single conditional UPDATE evaluated server-side, so two
//! processes racing for the lock cannot both observe "unlocked" and win.
//! The lock table bootstraps itself on first use, like the ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::database::{Database, SqlValue};
use crate::error::MigrateResult;
use crate::generator::{AnsiGenerator, SqlGenerator};
use crate::history::parse_row_timestamp;
use crate::statement::{ColumnDef, ColumnType, Statement};

/// Default name of the lock table.
pub const DEFAULT_LOCK_TABLE: &str = "strata_changelog_lock";

/// One lock row as reported by `list_locks`.
#[derive(Debug, Clone)]
pub struct LockInfo {
    /// Row id; a single-row table in practice.
    pub id: i64,
    /// Holder identity, e.g. `user@host`.
    pub locked_by: Option<String>,
    /// When the lock was granted.
    pub lock_granted: Option<DateTime<Utc>>,
}

/// The locking contract.
#[async_trait]
pub trait LockService: Send {
    /// Create or verify the lock storage. Idempotent.
    async fn init(&mut self, database: &mut Database) -> MigrateResult<()>;

    /// Try to acquire the lock for `actor`. Returns false if another holder
    /// has it; never blocks and never double-grants.
    async fn acquire(&mut self, database: &mut Database, actor: &str) -> MigrateResult<bool>;

    /// Release the lock held by this service.
    async fn release(&mut self, database: &mut Database) -> MigrateResult<()>;

    /// Current lock holders (zero or one row).
    async fn list_locks(&mut self, database: &mut Database) -> MigrateResult<Vec<LockInfo>>;

    /// Release the lock regardless of holder. For operators clearing a lock
    /// left behind by a crashed run.
    async fn force_release(&mut self, database: &mut Database) -> MigrateResult<()>;
}

/// SQL-backed lock in the target database.
pub struct TableLockService {
    table: String,
    initialized: bool,
    has_lock: bool,
}

impl TableLockService {
    /// Create a service over the default table name.
    pub fn new() -> Self {
        Self::with_table(DEFAULT_LOCK_TABLE)
    }

    /// Create a service over a custom table name.
    pub fn with_table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            initialized: false,
            has_lock: false,
        }
    }

    /// The lock table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Whether this service currently holds the lock.
    pub fn has_lock(&self) -> bool {
        self.has_lock
    }
}

impl Default for TableLockService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockService for TableLockService {
    async fn init(&mut self, database: &mut Database) -> MigrateResult<()> {
        if self.initialized {
            return Ok(());
        }

        if !database.table_exists(&self.table).await? {
            let statement = Statement::CreateTable {
                schema: None,
                table: self.table.clone(),
                columns: vec![
                    ColumnDef::new("id", ColumnType::Integer).primary_key(),
                    ColumnDef::new("locked", ColumnType::Boolean).not_null(),
                    ColumnDef::new("lockgranted", ColumnType::Timestamp),
                    ColumnDef::new("lockedby", ColumnType::VarChar(255)),
                ],
            };
            for sql in AnsiGenerator.generate(&statement, database)? {
                database.execute(&sql).await?;
            }
        }

        // The singleton row must exist before the conditional update can
        // ever succeed.
        let table = database.quote(&self.table);
        let rows = database
            .query(&format!("SELECT COUNT(*) AS rowcount FROM {table}"))
            .await?;
        let count = rows
            .first()
            .and_then(|row| row.first())
            .and_then(SqlValue::as_i64)
            .unwrap_or(0);
        if count == 0 {
            database
                .execute(&format!(
                    "INSERT INTO {table} (id, locked, lockgranted, lockedby) \
                     VALUES (1, {}, NULL, NULL)",
                    database.boolean_literal(false)
                ))
                .await?;
        }
        database.commit().await?;

        self.initialized = true;
        Ok(())
    }

    async fn acquire(&mut self, database: &mut Database, actor: &str) -> MigrateResult<bool> {
        let table = database.quote(&self.table);

        // All-or-nothing: the WHERE clause is evaluated by the server, so
        // only one concurrent caller can flip the row.
        let affected = database
            .execute(&format!(
                "UPDATE {table} SET locked = {}, lockedby = {}, lockgranted = {} \
                 WHERE id = 1 AND locked = {}",
                database.boolean_literal(true),
                database.escape_string_literal(actor),
                database.current_timestamp_function(),
                database.boolean_literal(false)
            ))
            .await?;
        database.commit().await?;

        self.has_lock = affected == 1;
        debug!(actor, acquired = self.has_lock, "change log lock attempt");
        Ok(self.has_lock)
    }

    async fn release(&mut self, database: &mut Database) -> MigrateResult<()> {
        let table = database.quote(&self.table);
        database
            .execute(&format!(
                "UPDATE {table} SET locked = {}, lockedby = NULL, lockgranted = NULL \
                 WHERE id = 1",
                database.boolean_literal(false)
            ))
            .await?;
        database.commit().await?;
        self.has_lock = false;
        Ok(())
    }

    async fn list_locks(&mut self, database: &mut Database) -> MigrateResult<Vec<LockInfo>> {
        let table = database.quote(&self.table);
        let rows = database
            .query(&format!(
                "SELECT id, locked, lockgranted, lockedby FROM {table} WHERE locked = {}",
                database.boolean_literal(true)
            ))
            .await?;

        Ok(rows
            .iter()
            .map(|row| LockInfo {
                id: row.get_i64("id").unwrap_or(1),
                locked_by: row.get_str("lockedby").map(str::to_string),
                lock_granted: row
                    .get("lockgranted")
                    .map(|value| parse_row_timestamp(Some(value))),
            })
            .collect())
    }

    async fn force_release(&mut self, database: &mut Database) -> MigrateResult<()> {
        warn!(table = %self.table, "force-releasing change log lock");
        self.release(database).await
    }
}

/// In-memory lock for tests. Clones share one underlying "row", so two
/// service instances model two processes racing for the same lock.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockService {
    state: Arc<Mutex<MemoryLockState>>,
    has_lock: bool,
}

#[derive(Debug, Default)]
struct MemoryLockState {
    locked: bool,
    locked_by: Option<String>,
    lock_granted: Option<DateTime<Utc>>,
}

impl MemoryLockService {
    /// Create an unlocked lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this handle holds the lock.
    pub fn has_lock(&self) -> bool {
        self.has_lock
    }
}

#[async_trait]
impl LockService for MemoryLockService {
    async fn init(&mut self, _database: &mut Database) -> MigrateResult<()> {
        Ok(())
    }

    async fn acquire(&mut self, _database: &mut Database, actor: &str) -> MigrateResult<bool> {
        // Mirrors the server-side conditional update: check and set under
        // one critical section.
        let mut state = self.state.lock().unwrap();
        if state.locked {
            return Ok(false);
        }
        state.locked = true;
        state.locked_by = Some(actor.to_string());
        state.lock_granted = Some(Utc::now());
        self.has_lock = true;
        Ok(true)
    }

    async fn release(&mut self, _database: &mut Database) -> MigrateResult<()> {
        let mut state = self.state.lock().unwrap();
        state.locked = false;
        state.locked_by = None;
        state.lock_granted = None;
        self.has_lock = false;
        Ok(())
    }

    async fn list_locks(&mut self, _database: &mut Database) -> MigrateResult<Vec<LockInfo>> {
        let state = self.state.lock().unwrap();
        if state.locked {
            Ok(vec![LockInfo {
                id: 1,
                locked_by: state.locked_by.clone(),
                lock_granted: state.lock_granted,
            }])
        } else {
            Ok(Vec::new())
        }
    }

    async fn force_release(&mut self, database: &mut Database) -> MigrateResult<()> {
        self.release(database).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DatabaseKind, MemoryConnection, Row};

    fn db() -> Database {
        Database::new(DatabaseKind::Postgres, Box::new(MemoryConnection::new()))
    }

    #[tokio::test]
    async fn test_acquire_sql_is_conditional() {
        let mut connection = MemoryConnection::new();
        connection.add_table(DEFAULT_LOCK_TABLE, &["id", "locked"]);
        connection.push_query_result(vec![Row::new().with("rowcount", SqlValue::Int(1))]);
        let log = connection.log_handle();
        let mut database = Database::new(DatabaseKind::Postgres, Box::new(connection));

        let mut lock = TableLockService::new();
        lock.init(&mut database).await.unwrap();
        lock.acquire(&mut database, "alice@host-1").await.unwrap();

        let update = log
            .statements()
            .into_iter()
            .find(|sql| sql.starts_with("UPDATE"))
            .unwrap();
        // The check-and-set must be one server-side statement.
        assert!(update.contains("WHERE id = 1 AND locked = FALSE"));
        assert!(update.contains("'alice@host-1'"));
    }

    #[tokio::test]
    async fn test_memory_lock_mutual_exclusion() {
        let mut database = db();
        let mut first = MemoryLockService::new();
        let mut second = first.clone();

        // Exactly one of two acquirers wins; the loser sees "unavailable",
        // never a silent double grant.
        assert!(first.acquire(&mut database, "one").await.unwrap());
        assert!(!second.acquire(&mut database, "two").await.unwrap());
        assert!(first.has_lock());
        assert!(!second.has_lock());

        first.release(&mut database).await.unwrap();
        assert!(second.acquire(&mut database, "two").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_locks_reports_holder() {
        let mut database = db();
        let mut lock = MemoryLockService::new();

        assert!(lock.list_locks(&mut database).await.unwrap().is_empty());

        lock.acquire(&mut database, "alice@host-1").await.unwrap();
        let locks = lock.list_locks(&mut database).await.unwrap();
        assert_eq!(locks.len(), 1);
        assert_eq!(locks[0].locked_by.as_deref(), Some("alice@host-1"));
    }

    #[tokio::test]
    async fn test_force_release_clears_foreign_lock() {
        let mut database = db();
        let mut holder = MemoryLockService::new();
        let mut other = holder.clone();

        holder.acquire(&mut database, "crashed-process").await.unwrap();
        other.force_release(&mut database).await.unwrap();
        assert!(other.acquire(&mut database, "operator").await.unwrap());
    }
}
