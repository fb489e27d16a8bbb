//! MySQL-specific SQL generation.

use crate::database::Database;
use crate::error::{MigrateResult, UnsupportedError};
use crate::statement::{Statement, StatementKind};

use super::ansi::{add_column_sql, create_table_sql, type_sql, AutoIncrementStyle};
use super::SqlGenerator;

/// MySQL overrides: `AUTO_INCREMENT` columns, index-based constraint drops,
/// and `MODIFY`-style nullability changes that must restate the column type.
pub struct MySqlGenerator;

impl MySqlGenerator {
    /// Statement kinds this generator claims.
    pub const OVERRIDES: [StatementKind; 6] = [
        StatementKind::CreateTable,
        StatementKind::AddColumn,
        StatementKind::SetNullable,
        StatementKind::DropIndex,
        StatementKind::DropForeignKey,
        StatementKind::DropUniqueConstraint,
    ];
}

impl SqlGenerator for MySqlGenerator {
    fn validate(&self, statement: &Statement, _database: &Database) -> Result<(), UnsupportedError> {
        if let Statement::SetNullable { column_type, .. } = statement {
            // MODIFY restates the whole column definition.
            if column_type.is_none() {
                return Err(UnsupportedError::new(
                    "setNullable without a column type",
                    "mysql",
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
                AutoIncrementStyle::Suffix("AUTO_INCREMENT"),
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
                AutoIncrementStyle::Suffix("AUTO_INCREMENT"),
                "ADD COLUMN",
            )?]),
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
                    "ALTER TABLE {} MODIFY {} {ty} {null_kw}",
                    database.quote_qualified(schema.as_deref(), table),
                    database.quote(column)
                )])
            }
            Statement::DropIndex {
                schema,
                table,
                name,
            } => Ok(vec![format!(
                "DROP INDEX {} ON {}",
                database.quote(name),
                database.quote_qualified(schema.as_deref(), table)
            )]),
            Statement::DropForeignKey {
                schema,
                table,
                name,
            } => Ok(vec![format!(
                "ALTER TABLE {} DROP FOREIGN KEY {}",
                database.quote_qualified(schema.as_deref(), table),
                database.quote(name)
            )]),
            Statement::DropUniqueConstraint {
                schema,
                table,
                name,
            } => Ok(vec![format!(
                "ALTER TABLE {} DROP INDEX {}",
                database.quote_qualified(schema.as_deref(), table),
                database.quote(name)
            )]),
            other => super::AnsiGenerator.generate(other, database),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DatabaseKind, MemoryConnection};
    use crate::statement::{ColumnDef, ColumnType};

    fn db() -> Database {
        Database::new(DatabaseKind::MySql, Box::new(MemoryConnection::new()))
    }

    #[test]
    fn test_auto_increment_suffix() {
        let stmt = Statement::CreateTable {
            schema: None,
            table: "users".to_string(),
            columns: vec![ColumnDef::new("id", ColumnType::BigInt)
                .primary_key()
                .auto_increment()],
        };

        let sql = MySqlGenerator.generate(&stmt, &db()).unwrap();
        assert!(sql[0].contains("id BIGINT AUTO_INCREMENT PRIMARY KEY"));
    }

    #[test]
    fn test_set_nullable_requires_type() {
        let stmt = Statement::SetNullable {
            schema: None,
            table: "users".to_string(),
            column: "email".to_string(),
            column_type: None,
            nullable: false,
        };
        assert!(MySqlGenerator.validate(&stmt, &db()).is_err());

        let stmt = Statement::SetNullable {
            schema: None,
            table: "users".to_string(),
            column: "email".to_string(),
            column_type: Some(ColumnType::VarChar(255)),
            nullable: false,
        };
        let sql = MySqlGenerator.generate(&stmt, &db()).unwrap();
        assert_eq!(sql, vec!["ALTER TABLE users MODIFY email VARCHAR(255) NOT NULL"]);
    }

    #[test]
    fn test_drop_index_names_table() {
        let stmt = Statement::DropIndex {
            schema: None,
            table: "users".to_string(),
            name: "idx_users_email".to_string(),
        };

        let sql = MySqlGenerator.generate(&stmt, &db()).unwrap();
        assert_eq!(sql, vec!["DROP INDEX idx_users_email ON users"]);
    }

    #[test]
    fn test_drop_foreign_key_spelling() {
        let stmt = Statement::DropForeignKey {
            schema: None,
            table: "posts".to_string(),
            name: "fk_posts_author".to_string(),
        };

        let sql = MySqlGenerator.generate(&stmt, &db()).unwrap();
        assert_eq!(sql, vec!["ALTER TABLE posts DROP FOREIGN KEY fk_posts_author"]);
    }
}
