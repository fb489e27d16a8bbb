//! SQLite-specific SQL generation.
//!
//! SQLite's ALTER TABLE is deliberately small. Where another dialect would
//! alter in place, the generator either translates to an equivalent
//! statement sequence (unique constraints become unique indexes) or rejects
//! the operation at validation time.

use crate::database::Database;
use crate::error::{MigrateResult, UnsupportedError};
use crate::statement::{ColumnDef, ColumnType, Statement, StatementKind};

use super::ansi::{add_column_sql, create_table_sql, AutoIncrementStyle};
use super::SqlGenerator;

/// SQLite overrides.
pub struct SqliteGenerator;

impl SqliteGenerator {
    /// Statement kinds this generator claims.
    pub const OVERRIDES: [StatementKind; 7] = [
        StatementKind::CreateTable,
        StatementKind::AddColumn,
        StatementKind::AddUniqueConstraint,
        StatementKind::DropUniqueConstraint,
        StatementKind::AddForeignKey,
        StatementKind::DropForeignKey,
        StatementKind::SetNullable,
    ];
}

fn check_auto_increment(column: &ColumnDef, in_create_table: bool) -> Result<(), UnsupportedError> {
    if !column.is_auto_increment() {
        return Ok(());
    }
    if !in_create_table {
        // ADD COLUMN cannot introduce a primary key.
        return Err(UnsupportedError::new(
            "addColumn with autoIncrement",
            "sqlite",
        ));
    }
    if !matches!(column.column_type, ColumnType::Integer) || !column.is_primary_key() {
        return Err(UnsupportedError::new(
            "autoIncrement outside INTEGER PRIMARY KEY",
            "sqlite",
        ));
    }
    Ok(())
}

impl SqlGenerator for SqliteGenerator {
    fn validate(&self, statement: &Statement, _database: &Database) -> Result<(), UnsupportedError> {
        match statement {
            Statement::CreateTable { columns, .. } => {
                for column in columns {
                    check_auto_increment(column, true)?;
                }
                let auto_pk = columns
                    .iter()
                    .any(|c| c.is_auto_increment() && c.is_primary_key());
                let pk_count = columns.iter().filter(|c| c.is_primary_key()).count();
                if auto_pk && pk_count > 1 {
                    return Err(UnsupportedError::new(
                        "autoIncrement in a composite primary key",
                        "sqlite",
                    ));
                }
                Ok(())
            }
            Statement::AddColumn { column, .. } => {
                check_auto_increment(column, false)?;
                if column.is_primary_key() || column.is_unique() {
                    return Err(UnsupportedError::new(
                        "addColumn with a key constraint",
                        "sqlite",
                    ));
                }
                Ok(())
            }
            Statement::AddForeignKey { .. } => Err(UnsupportedError::new(
                "addForeignKeyConstraint",
                "sqlite",
            )),
            Statement::DropForeignKey { .. } => Err(UnsupportedError::new(
                "dropForeignKeyConstraint",
                "sqlite",
            )),
            Statement::SetNullable { .. } => {
                Err(UnsupportedError::new("setNullable", "sqlite"))
            }
            _ => Ok(()),
        }
    }

    fn generate(&self, statement: &Statement, database: &Database) -> MigrateResult<Vec<String>> {
        self.validate(statement, database)?;

        match statement {
            Statement::CreateTable {
                schema,
                table,
                columns,
            } => Ok(vec![create_table_sql(
                database,
                schema.as_deref(),
                table,
                columns,
                AutoIncrementStyle::IntegerPrimaryKey,
            )?]),
            Statement::AddColumn {
                schema,
                table,
                column,
            } => Ok(vec![add_column_sql(
                database,
                schema.as_deref(),
                table,
                column,
                AutoIncrementStyle::IntegerPrimaryKey,
                "ADD COLUMN",
            )?]),
            // No ALTER TABLE ADD CONSTRAINT: express the constraint as a
            // unique index, which is semantically equivalent here.
            Statement::AddUniqueConstraint {
                schema,
                table,
                name,
                columns,
            } => {
                let cols: Vec<String> = columns.iter().map(|c| database.quote(c)).collect();
                Ok(vec![format!(
                    "CREATE UNIQUE INDEX {} ON {} ({})",
                    database.quote(name),
                    database.quote_qualified(schema.as_deref(), table),
                    cols.join(", ")
                )])
            }
            Statement::DropUniqueConstraint { name, .. } => {
                Ok(vec![format!("DROP INDEX {}", database.quote(name))])
            }
            other => super::AnsiGenerator.generate(other, database),
        }
    }
}
