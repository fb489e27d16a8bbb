//! SQL Server-specific SQL generation.

use crate::database::Database;
use crate::error::{MigrateResult, UnsupportedError};
use crate::statement::{Statement, StatementKind};

use super::ansi::{add_column_sql, create_table_sql, render_default, type_sql, AutoIncrementStyle};
use super::SqlGenerator;

/// SQL Server overrides: `IDENTITY` columns, `sp_rename`, named default
/// constraints, and table rebuilds after add-with-default.
pub struct MssqlGenerator;

impl MssqlGenerator {
    /// Statement kinds this generator claims.
    pub const OVERRIDES: [StatementKind; 9] = [
        StatementKind::CreateTable,
        StatementKind::AddColumn,
        StatementKind::RenameTable,
        StatementKind::RenameColumn,
        StatementKind::SetNullable,
        StatementKind::SetDefaultValue,
        StatementKind::DropDefaultValue,
        StatementKind::DropIndex,
        StatementKind::ReorganizeTable,
    ];
}

/// Deterministic name for a column default constraint, so it can be dropped
/// without a catalog lookup.
fn default_constraint_name(table: &str, column: &str) -> String {
    format!("DF_{table}_{column}")
}

impl SqlGenerator for MssqlGenerator {
    fn validate(&self, statement: &Statement, _database: &Database) -> Result<(), UnsupportedError> {
        if let Statement::SetNullable { column_type, .. } = statement {
            // ALTER COLUMN restates the whole column definition.
            if column_type.is_none() {
                return Err(UnsupportedError::new(
                    "setNullable without a column type",
                    "mssql",
                ));
            }
        }
        Ok(())
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
                AutoIncrementStyle::Suffix("IDENTITY(1,1)"),
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
                AutoIncrementStyle::Suffix("IDENTITY(1,1)"),
                "ADD",
            )?]),
            Statement::RenameTable { schema, from, to } => Ok(vec![format!(
                "EXEC sp_rename '{}', '{}'",
                database.quote_qualified(schema.as_deref(), from),
                to
            )]),
            Statement::RenameColumn {
                schema,
                table,
                from,
                to,
            } => Ok(vec![format!(
                "EXEC sp_rename '{}.{}', '{}', 'COLUMN'",
                database.quote_qualified(schema.as_deref(), table),
                from,
                to
            )]),
            Statement::SetNullable {
                schema,
                table,
                column,
                column_type,
                nullable,
            } => {
                let ty = column_type
                    .as_ref()
                    .map(|t| type_sql(database.kind(), t))
                    .unwrap_or_default();
                let null_kw = if *nullable { "NULL" } else { "NOT NULL" };
                Ok(vec![format!(
                    "ALTER TABLE {} ALTER COLUMN {} {ty} {null_kw}",
                    database.quote_qualified(schema.as_deref(), table),
                    database.quote(column)
                )])
            }
            Statement::SetDefaultValue {
                schema,
                table,
                column,
                default,
            } => Ok(vec![format!(
                "ALTER TABLE {} ADD CONSTRAINT {} DEFAULT {} FOR {}",
                database.quote_qualified(schema.as_deref(), table),
                database.quote(&default_constraint_name(table, column)),
                render_default(database, default),
                database.quote(column)
            )]),
            Statement::DropDefaultValue {
                schema,
                table,
                column,
            } => Ok(vec![format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                database.quote_qualified(schema.as_deref(), table),
                database.quote(&default_constraint_name(table, column))
            )]),
            Statement::DropIndex {
                schema,
                table,
                name,
            } => Ok(vec![format!(
                "DROP INDEX {} ON {}",
                database.quote(name),
                database.quote_qualified(schema.as_deref(), table)
            )]),
            Statement::ReorganizeTable { schema, table } => Ok(vec![format!(
                "ALTER TABLE {} REBUILD",
                database.quote_qualified(schema.as_deref(), table)
            )]),
            other => super::AnsiGenerator.generate(other, database),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DatabaseKind, MemoryConnection};
    use crate::statement::{ColumnDef, ColumnType, DefaultValue};

    fn db() -> Database {
        Database::new(DatabaseKind::Mssql, Box::new(MemoryConnection::new()))
    }

    #[test]
    fn test_identity_column() {
        let stmt = Statement::CreateTable {
            schema: None,
            table: "users".to_string(),
            columns: vec![ColumnDef::new("id", ColumnType::BigInt)
                .primary_key()
                .auto_increment()],
        };

        let sql = MssqlGenerator.generate(&stmt, &db()).unwrap();
        assert!(sql[0].contains("id BIGINT IDENTITY(1,1) PRIMARY KEY"));
    }

    #[test]
    fn test_add_column_has_no_column_keyword() {
        let stmt = Statement::AddColumn {
            schema: None,
            table: "users".to_string(),
            column: ColumnDef::new("active", ColumnType::Boolean),
        };

        let sql = MssqlGenerator.generate(&stmt, &db()).unwrap();
        assert_eq!(sql, vec!["ALTER TABLE users ADD active BIT"]);
    }

    #[test]
    fn test_rename_column_uses_sp_rename() {
        let stmt = Statement::RenameColumn {
            schema: None,
            table: "users".to_string(),
            from: "name".to_string(),
            to: "full_name".to_string(),
        };

        let sql = MssqlGenerator.generate(&stmt, &db()).unwrap();
        assert_eq!(sql, vec!["EXEC sp_rename 'users.name', 'full_name', 'COLUMN'"]);
    }

    #[test]
    fn test_default_round_trip_uses_named_constraint() {
        let set = Statement::SetDefaultValue {
            schema: None,
            table: "users".to_string(),
            column: "active".to_string(),
            default: DefaultValue::Boolean(true),
        };
        let sql = MssqlGenerator.generate(&set, &db()).unwrap();
        assert_eq!(
            sql,
            vec!["ALTER TABLE users ADD CONSTRAINT DF_users_active DEFAULT 1 FOR active"]
        );

        let drop = Statement::DropDefaultValue {
            schema: None,
            table: "users".to_string(),
            column: "active".to_string(),
        };
        let sql = MssqlGenerator.generate(&drop, &db()).unwrap();
        assert_eq!(sql, vec!["ALTER TABLE users DROP CONSTRAINT DF_users_active"]);
    }

    #[test]
    fn test_reorganize_is_rebuild() {
        let stmt = Statement::ReorganizeTable {
            schema: None,
            table: "users".to_string(),
        };
        let sql = MssqlGenerator.generate(&stmt, &db()).unwrap();
        assert_eq!(sql, vec!["ALTER TABLE users REBUILD"]);
    }
}
