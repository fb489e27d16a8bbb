//! # strata-core
//!
//! A database schema migration engine: declared, idempotent change sets are
//! applied to a target database in order, tracked in a ledger table, and
//! reversed on demand.
//!
//! This crate provides:
//! - The change model: [`Change`], [`ChangeSet`], [`ChangeLog`], with
//!   TOML-based changelog files and `include` composition
//! - Dialect-neutral [`Statement`]s and a [`GeneratorRegistry`] that turns
//!   them into SQL for PostgreSQL, MySQL, SQLite, and SQL Server
//! - The run ledger ([`HistoryService`]) with version-tagged checksums
//! - The change log lock ([`LockService`]) serializing concurrent runs
//! - The [`Executor`] driving update and rollback passes
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐     ┌────────────┐     ┌───────────────┐
//! │ ChangeLog │────▶│  Executor  │────▶│ Change        │
//! └───────────┘     └────────────┘     │  └ Statement  │
//!                        │ │           └───────────────┘
//!            ┌───────────┘ └─────────┐         │
//!            ▼                       ▼         ▼
//!    ┌───────────────┐     ┌─────────────┐  ┌────────────────┐
//!    │ LockService   │     │ History     │  │ Generator      │
//!    │ (mutual excl.)│     │ (ledger)    │  │ Registry (SQL) │
//!    └───────────────┘     └─────────────┘  └────────┬───────┘
//!                                                    ▼
//!                                           ┌────────────────┐
//!                                           │ Database       │
//!                                           │ (capabilities, │
//!                                           │  connection)   │
//!                                           └────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_core::{
//!     ChangeLog, Database, DatabaseKind, Executor, MemoryLockService,
//!     RunOptions, TableHistoryService, TableLockService,
//! };
//!
//! async fn migrate(connection: Box<dyn strata_core::DatabaseConnection>)
//! -> Result<(), Box<dyn std::error::Error>> {
//!     let changelog = ChangeLog::load("db/changelog.toml").await?;
//!
//!     let database = Database::new(DatabaseKind::Postgres, connection);
//!     let mut executor = Executor::new(
//!         database,
//!         TableHistoryService::new(),
//!         TableLockService::new(),
//!     )
//!     .with_options(RunOptions::new().contexts(["prod"]));
//!
//!     let report = executor.update(&changelog).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

pub mod change;
pub mod changelog;
pub mod changeset;
pub mod checksum;
pub mod database;
pub mod error;
pub mod executor;
pub mod filter;
pub mod generator;
pub mod history;
pub mod lock;
pub mod precondition;
pub mod statement;

// Re-exports
pub use change::{Change, ObjectKind, ObjectRef, RollbackSupport};
pub use changelog::ChangeLog;
pub use changeset::{ChangeSet, ChangeSetId};
pub use checksum::{Checksum, CURRENT_CHECKSUM_VERSION};
pub use database::{
    Capabilities, Database, DatabaseConnection, DatabaseKind, MemoryConnection, QuotingStrategy,
    Row, SqlValue, StatementLog,
};
pub use error::{MigrateResult, MigrationError, UnsupportedError, ValidationErrors, ValidationIssue};
pub use executor::{
    ChangeSetOutcome, ChangeSetReport, Executor, RollbackTarget, RunListener, RunOptions,
    RunReport, StatusReport,
};
pub use filter::FilterExpression;
pub use generator::{
    AnsiGenerator, GeneratorRegistry, MssqlGenerator, MySqlGenerator, PostgresGenerator,
    SqlGenerator, SqliteGenerator,
};
pub use history::{
    ExecType, HistoryService, MemoryHistoryService, RanChangeSet, TableHistoryService,
    DEFAULT_HISTORY_TABLE,
};
pub use lock::{LockInfo, LockService, MemoryLockService, TableLockService, DEFAULT_LOCK_TABLE};
pub use precondition::{FailAction, Precondition, PreconditionCheck};
pub use statement::{
    ColumnConstraint, ColumnDef, ColumnType, DefaultValue, ForeignKeyRef, ReferentialAction,
    Statement, StatementKind,
};
