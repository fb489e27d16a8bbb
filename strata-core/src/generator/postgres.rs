//! PostgreSQL-specific SQL generation.

use crate::database::Database;
use crate::error::{MigrateResult, UnsupportedError};
use crate::statement::{ColumnDef, ColumnType, Statement, StatementKind};

use super::ansi::{add_column_sql, create_table_sql, AutoIncrementStyle};
use super::SqlGenerator;

/// PostgreSQL overrides: auto-increment columns become SERIAL pseudo-types.
pub struct PostgresGenerator;

impl PostgresGenerator {
    /// Statement kinds this generator claims.
    pub const OVERRIDES: [StatementKind; 2] = [StatementKind::CreateTable, StatementKind::AddColumn];
}

fn check_serial_type(column: &ColumnDef) -> Result<(), UnsupportedError> {
    if column.is_auto_increment()
        && !matches!(
            column.column_type,
            ColumnType::Integer | ColumnType::BigInt | ColumnType::SmallInt
        )
    {
        return Err(UnsupportedError::new(
            "autoIncrement on a non-integer column",
            "postgresql",
        ));
    }
    Ok(())
}

impl SqlGenerator for PostgresGenerator {
    fn validate(&self, statement: &Statement, _database: &Database) -> Result<(), UnsupportedError> {
        match statement {
            Statement::CreateTable { columns, .. } => {
                columns.iter().try_for_each(check_serial_type)
            }
            Statement::AddColumn { column, .. } => check_serial_type(column),
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
                AutoIncrementStyle::Serial,
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
                AutoIncrementStyle::Serial,
                "ADD COLUMN",
            )?]),
            other => super::AnsiGenerator.generate(other, database),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DatabaseKind, MemoryConnection};

    fn db() -> Database {
        Database::new(DatabaseKind::Postgres, Box::new(MemoryConnection::new()))
    }

    #[test]
    fn test_serial_types() {
        let stmt = Statement::CreateTable {
            schema: None,
            table: "users".to_string(),
            columns: vec![
                ColumnDef::new("id", ColumnType::BigInt)
                    .primary_key()
                    .auto_increment(),
                ColumnDef::new("email", ColumnType::Text).not_null(),
            ],
        };

        let sql = PostgresGenerator.generate(&stmt, &db()).unwrap();
        assert!(sql[0].contains("id BIGSERIAL PRIMARY KEY"));
    }

    #[test]
    fn test_serial_rejects_text_column() {
        let stmt = Statement::AddColumn {
            schema: None,
            table: "users".to_string(),
            column: ColumnDef::new("code", ColumnType::Text).auto_increment(),
        };

        assert!(PostgresGenerator.validate(&stmt, &db()).is_err());
    }
}
