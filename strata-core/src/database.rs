//! Database abstraction.
//!
//! [`Database`] wraps one physical connection behind the
//! [`DatabaseConnection`] trait and describes the target dialect to every
//! other component: quoting rules, capability flags, boolean literals, and
//! identifier limits. Drivers live outside this crate; tests and offline
//! tooling use [`MemoryConnection`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::debug;

use crate::error::MigrateResult;

/// A single value in a query result row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// Text.
    Text(String),
    /// Timestamp.
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    /// The value as text, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The value as an integer, coercing integer-shaped text.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// The value as a boolean, coercing the common driver spellings.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(n) => Some(*n != 0),
            Self::Text(s) => match s.to_ascii_lowercase().as_str() {
                "t" | "true" | "1" => Some(true),
                "f" | "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// The value as a timestamp.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Whether the value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// One query result row: column name to value, in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: IndexMap<String, SqlValue>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column value. Column names are stored lowercase.
    pub fn with(mut self, column: impl Into<String>, value: SqlValue) -> Self {
        self.columns
            .insert(column.into().to_ascii_lowercase(), value);
        self
    }

    /// Get a column value by (case-insensitive) name.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns.get(&column.to_ascii_lowercase())
    }

    /// The first column's value, for scalar queries.
    pub fn first(&self) -> Option<&SqlValue> {
        self.columns.values().next()
    }

    /// Get a text column, treating NULL and absence as `None`.
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(SqlValue::as_str)
    }

    /// Get an integer column.
    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(SqlValue::as_i64)
    }

    /// Get a boolean column.
    pub fn get_bool(&self, column: &str) -> Option<bool> {
        self.get(column).and_then(SqlValue::as_bool)
    }

    /// Get a timestamp column.
    pub fn get_timestamp(&self, column: &str) -> Option<DateTime<Utc>> {
        self.get(column).and_then(SqlValue::as_timestamp)
    }
}

/// A connection-like capability: execute SQL, commit, roll back, and answer
/// catalog questions. Pooling and credentials are the driver's concern.
#[async_trait]
pub trait DatabaseConnection: Send {
    /// Execute a statement, returning the number of affected rows.
    async fn execute(&mut self, sql: &str) -> MigrateResult<u64>;

    /// Run a query and return all rows.
    async fn query(&mut self, sql: &str) -> MigrateResult<Vec<Row>>;

    /// Commit the current transaction, if the driver runs one.
    async fn commit(&mut self) -> MigrateResult<()>;

    /// Roll back the current transaction, if the driver runs one.
    async fn rollback(&mut self) -> MigrateResult<()>;

    /// Whether a table exists in the connection's default schema.
    async fn table_exists(&mut self, table: &str) -> MigrateResult<bool>;

    /// Whether a column exists on a table.
    async fn column_exists(&mut self, table: &str, column: &str) -> MigrateResult<bool>;

    /// All table names in the connection's default schema.
    async fn list_tables(&mut self) -> MigrateResult<Vec<String>>;
}

/// The supported database products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseKind {
    /// PostgreSQL.
    Postgres,
    /// MySQL / MariaDB.
    MySql,
    /// SQLite.
    Sqlite,
    /// Microsoft SQL Server.
    Mssql,
}

impl DatabaseKind {
    /// Canonical short name, as used in `dbms` changelog filters.
    pub fn name(self) -> &'static str {
        match self {
            Self::Postgres => "postgresql",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
            Self::Mssql => "mssql",
        }
    }

    /// Whether a `dbms` filter such as `"postgresql, mysql"` or `"!sqlite"`
    /// includes this database. An empty filter includes everything.
    pub fn matches_dbms(self, filter: &str) -> bool {
        let filter = filter.trim();
        if filter.is_empty() {
            return true;
        }

        let mut excluded = false;
        for part in filter.split(',') {
            let part = part.trim().to_ascii_lowercase();
            if let Some(negated) = part.strip_prefix('!') {
                if self.is_alias(negated.trim()) {
                    return false;
                }
                excluded = true;
            } else if self.is_alias(&part) {
                return true;
            }
        }

        // A purely negative filter includes everything it did not exclude.
        excluded
    }

    fn is_alias(self, name: &str) -> bool {
        match self {
            Self::Postgres => matches!(name, "postgresql" | "postgres" | "pg"),
            Self::MySql => matches!(name, "mysql" | "mariadb"),
            Self::Sqlite => matches!(name, "sqlite" | "sqlite3"),
            Self::Mssql => matches!(name, "mssql" | "sqlserver"),
        }
    }
}

impl std::fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Dialect capability flags, derived from the kind but overridable so tests
/// can exercise degraded paths.
#[derive(Debug, Clone)]
pub struct Capabilities {
    /// Sequences exist as first-class objects.
    pub supports_sequences: bool,
    /// DDL participates in transactions.
    pub supports_ddl_transactions: bool,
    /// Auto-increment columns are expressible.
    pub supports_auto_increment: bool,
    /// Columns can be dropped.
    pub supports_drop_column: bool,
    /// `CREATE OR REPLACE VIEW` is accepted.
    pub supports_create_or_replace_view: bool,
    /// Adding a column with a default requires a table reorganization before
    /// the table is usable again.
    pub requires_reorg_after_add_default: bool,
    /// Maximum identifier length.
    pub max_identifier_length: usize,
}

impl Capabilities {
    /// The capability set of a database kind.
    pub fn for_kind(kind: DatabaseKind) -> Self {
        match kind {
            DatabaseKind::Postgres => Self {
                supports_sequences: true,
                supports_ddl_transactions: true,
                supports_auto_increment: true,
                supports_drop_column: true,
                supports_create_or_replace_view: true,
                requires_reorg_after_add_default: false,
                max_identifier_length: 63,
            },
            DatabaseKind::MySql => Self {
                supports_sequences: false,
                supports_ddl_transactions: false,
                supports_auto_increment: true,
                supports_drop_column: true,
                supports_create_or_replace_view: true,
                requires_reorg_after_add_default: false,
                max_identifier_length: 64,
            },
            DatabaseKind::Sqlite => Self {
                supports_sequences: false,
                supports_ddl_transactions: true,
                supports_auto_increment: true,
                supports_drop_column: true,
                supports_create_or_replace_view: false,
                requires_reorg_after_add_default: false,
                max_identifier_length: 128,
            },
            DatabaseKind::Mssql => Self {
                supports_sequences: true,
                supports_ddl_transactions: true,
                supports_auto_increment: true,
                supports_drop_column: true,
                supports_create_or_replace_view: false,
                requires_reorg_after_add_default: true,
                max_identifier_length: 128,
            },
        }
    }
}

/// How identifiers are quoted in generated SQL.
///
/// Per-run mutable state: a change set may switch the strategy, and the
/// executor resets it when the change set completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuotingStrategy {
    /// Quote only identifiers that need it (reserved words, unsafe
    /// characters).
    #[default]
    Legacy,
    /// Quote every identifier.
    QuoteAll,
}

// Enough of the shared reserved set to keep legacy quoting honest.
const RESERVED_WORDS: &[&str] = &[
    "all", "and", "any", "as", "asc", "between", "by", "check", "column", "constraint", "create",
    "default", "delete", "desc", "distinct", "drop", "exists", "foreign", "from", "group",
    "having", "in", "index", "insert", "into", "is", "join", "key", "like", "not", "null", "on",
    "or", "order", "primary", "references", "select", "set", "table", "to", "union", "unique",
    "update", "user", "values", "view", "where",
];

/// Capability-describing adapter around one physical connection.
pub struct Database {
    connection: Box<dyn DatabaseConnection>,
    kind: DatabaseKind,
    capabilities: Capabilities,
    quoting: QuotingStrategy,
    default_schema: Option<String>,
}

impl Database {
    /// Wrap a connection to a database of the given kind.
    pub fn new(kind: DatabaseKind, connection: Box<dyn DatabaseConnection>) -> Self {
        Self {
            connection,
            kind,
            capabilities: Capabilities::for_kind(kind),
            quoting: QuotingStrategy::default(),
            default_schema: None,
        }
    }

    /// Override the capability set.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Set the default schema used when statements carry no qualifier.
    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = Some(schema.into());
        self
    }

    /// The database kind.
    pub fn kind(&self) -> DatabaseKind {
        self.kind
    }

    /// The capability set.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// The default schema, if one was configured.
    pub fn default_schema(&self) -> Option<&str> {
        self.default_schema.as_deref()
    }

    /// The current quoting strategy.
    pub fn quoting_strategy(&self) -> QuotingStrategy {
        self.quoting
    }

    /// Change the quoting strategy for the current change set.
    pub fn set_quoting_strategy(&mut self, strategy: QuotingStrategy) {
        self.quoting = strategy;
    }

    /// Restore the default quoting strategy. Called by the executor after
    /// every change set so settings cannot leak between change sets.
    pub fn reset_quoting_strategy(&mut self) {
        self.quoting = QuotingStrategy::default();
    }

    /// Quote a single identifier per the dialect and current strategy.
    pub fn quote(&self, identifier: &str) -> String {
        let needs_quoting = match self.quoting {
            QuotingStrategy::QuoteAll => true,
            QuotingStrategy::Legacy => {
                RESERVED_WORDS.contains(&identifier.to_ascii_lowercase().as_str())
                    || identifier.chars().next().is_some_and(|c| c.is_ascii_digit())
                    || !identifier
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
        };

        if !needs_quoting {
            return identifier.to_string();
        }

        match self.kind {
            DatabaseKind::Postgres | DatabaseKind::Sqlite => {
                format!("\"{}\"", identifier.replace('"', "\"\""))
            }
            DatabaseKind::MySql => format!("`{}`", identifier.replace('`', "``")),
            DatabaseKind::Mssql => format!("[{}]", identifier.replace(']', "]]")),
        }
    }

    /// Quote an optionally schema-qualified object name. Falls back to the
    /// configured default schema when the statement carries none.
    pub fn quote_qualified(&self, schema: Option<&str>, name: &str) -> String {
        match schema.or(self.default_schema.as_deref()) {
            Some(schema) => format!("{}.{}", self.quote(schema), self.quote(name)),
            None => self.quote(name),
        }
    }

    /// Escape a string for inclusion as a SQL literal.
    pub fn escape_string_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// The dialect's boolean literal.
    pub fn boolean_literal(&self, value: bool) -> &'static str {
        match self.kind {
            DatabaseKind::Mssql => {
                if value {
                    "1"
                } else {
                    "0"
                }
            }
            _ => {
                if value {
                    "TRUE"
                } else {
                    "FALSE"
                }
            }
        }
    }

    /// The dialect's current-timestamp function.
    pub fn current_timestamp_function(&self) -> &'static str {
        match self.kind {
            DatabaseKind::Mssql => "GETDATE()",
            _ => "CURRENT_TIMESTAMP",
        }
    }

    /// Execute a statement on the underlying connection.
    pub async fn execute(&mut self, sql: &str) -> MigrateResult<u64> {
        debug!(sql = %sql, "executing statement");
        self.connection.execute(sql).await
    }

    /// Run a query on the underlying connection.
    pub async fn query(&mut self, sql: &str) -> MigrateResult<Vec<Row>> {
        debug!(sql = %sql, "executing query");
        self.connection.query(sql).await
    }

    /// Commit the connection's transaction.
    pub async fn commit(&mut self) -> MigrateResult<()> {
        self.connection.commit().await
    }

    /// Roll back the connection's transaction.
    pub async fn rollback_transaction(&mut self) -> MigrateResult<()> {
        self.connection.rollback().await
    }

    /// Whether a table exists.
    pub async fn table_exists(&mut self, table: &str) -> MigrateResult<bool> {
        self.connection.table_exists(table).await
    }

    /// Whether a column exists.
    pub async fn column_exists(&mut self, table: &str, column: &str) -> MigrateResult<bool> {
        self.connection.column_exists(table, column).await
    }

    /// All table names in the default schema.
    pub async fn list_tables(&mut self) -> MigrateResult<Vec<String>> {
        self.connection.list_tables().await
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("kind", &self.kind)
            .field("quoting", &self.quoting)
            .field("default_schema", &self.default_schema)
            .finish_non_exhaustive()
    }
}

/// Shared view of the statements a [`MemoryConnection`] has run. Clones
/// stay valid after the connection is boxed into a [`Database`].
#[derive(Debug, Clone, Default)]
pub struct StatementLog {
    inner: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
}

impl StatementLog {
    fn record(&self, sql: &str) {
        self.inner.lock().unwrap().push(sql.to_string());
    }

    /// A snapshot of every statement run so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.inner.lock().unwrap().clone()
    }

    /// Number of statements run so far.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    /// Whether nothing has run yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An in-memory connection for tests and offline tooling.
///
/// Records every statement into a shareable [`StatementLog`]; catalog
/// answers come from tables registered up front.
#[derive(Debug, Default)]
pub struct MemoryConnection {
    log: StatementLog,
    committed: usize,
    rolled_back: usize,
    tables: IndexMap<String, Vec<String>>,
    /// Queued query results, served FIFO.
    query_results: Vec<Vec<Row>>,
    /// Statements containing this pattern fail with the given message.
    failure: Option<(String, String)>,
}

impl MemoryConnection {
    /// Create an empty connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle onto the statement log, valid after boxing.
    pub fn log_handle(&self) -> StatementLog {
        self.log.clone()
    }

    /// Register a table (and its columns) in the fake catalog.
    pub fn add_table(&mut self, table: &str, columns: &[&str]) {
        self.tables.insert(
            table.to_ascii_lowercase(),
            columns.iter().map(|c| c.to_ascii_lowercase()).collect(),
        );
    }

    /// Queue rows to be returned by the next `query` call.
    pub fn push_query_result(&mut self, rows: Vec<Row>) {
        self.query_results.push(rows);
    }

    /// Make any statement containing `pattern` fail.
    pub fn fail_when_contains(&mut self, pattern: impl Into<String>, message: impl Into<String>) {
        self.failure = Some((pattern.into(), message.into()));
    }

    /// Number of commits.
    pub fn commit_count(&self) -> usize {
        self.committed
    }
}

#[async_trait]
impl DatabaseConnection for MemoryConnection {
    async fn execute(&mut self, sql: &str) -> MigrateResult<u64> {
        if let Some((pattern, message)) = &self.failure {
            if sql.contains(pattern.as_str()) {
                return Err(crate::error::MigrationError::database(message.clone()));
            }
        }
        self.log.record(sql);
        Ok(0)
    }

    async fn query(&mut self, sql: &str) -> MigrateResult<Vec<Row>> {
        self.log.record(sql);
        if self.query_results.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(self.query_results.remove(0))
        }
    }

    async fn commit(&mut self) -> MigrateResult<()> {
        self.committed += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> MigrateResult<()> {
        self.rolled_back += 1;
        Ok(())
    }

    async fn table_exists(&mut self, table: &str) -> MigrateResult<bool> {
        Ok(self.tables.contains_key(&table.to_ascii_lowercase()))
    }

    async fn column_exists(&mut self, table: &str, column: &str) -> MigrateResult<bool> {
        Ok(self
            .tables
            .get(&table.to_ascii_lowercase())
            .is_some_and(|cols| cols.contains(&column.to_ascii_lowercase())))
    }

    async fn list_tables(&mut self) -> MigrateResult<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }
}
