//! Dialect dispatch for SQL generation.
//!
//! A [`GeneratorRegistry`] maps a (statement kind, database kind) pair to
//! the [`SqlGenerator`] responsible for it. Resolution picks the most
//! specific match: a generator registered for a concrete database outranks
//! the generic ANSI fallback. Registration guarantees uniqueness per
//! (kind, concrete database) pair, so resolution is never ambiguous.

mod ansi;
mod mssql;
mod mysql;
mod postgres;
mod sqlite;

pub use ansi::AnsiGenerator;
pub use mssql::MssqlGenerator;
pub use mysql::MySqlGenerator;
pub use postgres::PostgresGenerator;
pub use sqlite::SqliteGenerator;

use std::collections::HashMap;
use std::sync::Arc;

use crate::database::{Database, DatabaseKind};
use crate::error::{MigrateResult, MigrationError, UnsupportedError};
use crate::statement::{Statement, StatementKind};

/// Translates dialect-neutral statements into executable SQL.
pub trait SqlGenerator: Send + Sync {
    /// Reject statements the target dialect cannot express. Called before
    /// `generate`, and separately during changelog validation so
    /// unsupported operations surface before anything executes.
    fn validate(&self, statement: &Statement, database: &Database) -> Result<(), UnsupportedError> {
        let _ = (statement, database);
        Ok(())
    }

    /// Emit the SQL for one statement. May return several statements when
    /// the dialect needs a sequence to express the operation.
    fn generate(&self, statement: &Statement, database: &Database) -> MigrateResult<Vec<String>>;
}

/// Registry of generators keyed by (statement kind, database kind).
pub struct GeneratorRegistry {
    entries: HashMap<(StatementKind, Option<DatabaseKind>), Arc<dyn SqlGenerator>>,
}

impl GeneratorRegistry {
    /// An empty registry. Most callers want [`GeneratorRegistry::standard`].
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// The built-in generator set: the ANSI fallback for every statement
    /// kind, plus the dialect overrides for PostgreSQL, MySQL, SQLite, and
    /// SQL Server.
    pub fn standard() -> Self {
        let mut registry = Self::new();

        let ansi: Arc<dyn SqlGenerator> = Arc::new(AnsiGenerator);
        for kind in StatementKind::ALL {
            registry.entries.insert((kind, None), ansi.clone());
        }

        let postgres: Arc<dyn SqlGenerator> = Arc::new(PostgresGenerator);
        for kind in PostgresGenerator::OVERRIDES {
            registry
                .entries
                .insert((kind, Some(DatabaseKind::Postgres)), postgres.clone());
        }

        let mysql: Arc<dyn SqlGenerator> = Arc::new(MySqlGenerator);
        for kind in MySqlGenerator::OVERRIDES {
            registry
                .entries
                .insert((kind, Some(DatabaseKind::MySql)), mysql.clone());
        }

        let sqlite: Arc<dyn SqlGenerator> = Arc::new(SqliteGenerator);
        for kind in SqliteGenerator::OVERRIDES {
            registry
                .entries
                .insert((kind, Some(DatabaseKind::Sqlite)), sqlite.clone());
        }

        let mssql: Arc<dyn SqlGenerator> = Arc::new(MssqlGenerator);
        for kind in MssqlGenerator::OVERRIDES {
            registry
                .entries
                .insert((kind, Some(DatabaseKind::Mssql)), mssql.clone());
        }

        registry
    }

    /// Register a generator for a statement kind, either for one concrete
    /// database or (with `None`) as the generic fallback. Registering a
    /// second generator for the same pair is an error, never a silent
    /// override.
    pub fn register(
        &mut self,
        kind: StatementKind,
        database: Option<DatabaseKind>,
        generator: Arc<dyn SqlGenerator>,
    ) -> MigrateResult<()> {
        if self.entries.contains_key(&(kind, database)) {
            return Err(MigrationError::other(format!(
                "a generator for ({}, {}) is already registered",
                kind.name(),
                database.map_or("any", DatabaseKind::name),
            )));
        }
        self.entries.insert((kind, database), generator);
        Ok(())
    }

    /// Resolve the generator for a statement kind on a database. The
    /// dialect-specific entry wins over the generic one.
    pub fn resolve(
        &self,
        kind: StatementKind,
        database: DatabaseKind,
    ) -> Option<&dyn SqlGenerator> {
        self.entries
            .get(&(kind, Some(database)))
            .or_else(|| self.entries.get(&(kind, None)))
            .map(Arc::as_ref)
    }

    /// Validate a statement against the target database without generating.
    pub fn validate(
        &self,
        statement: &Statement,
        database: &Database,
    ) -> Result<(), UnsupportedError> {
        match self.resolve(statement.kind(), database.kind()) {
            Some(generator) => generator.validate(statement, database),
            None => Err(UnsupportedError::new(
                statement.kind().name(),
                database.kind().name(),
            )),
        }
    }

    /// Resolve, validate, and generate the SQL for one statement.
    pub fn generate(
        &self,
        statement: &Statement,
        database: &Database,
    ) -> MigrateResult<Vec<String>> {
        let generator = self
            .resolve(statement.kind(), database.kind())
            .ok_or_else(|| {
                MigrationError::Unsupported(UnsupportedError::new(
                    statement.kind().name(),
                    database.kind().name(),
                ))
            })?;
        generator.validate(statement, database)?;
        generator.generate(statement, database)
    }
}

impl Default for GeneratorRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
