//! Generic ANSI-flavored SQL generation.
//!
//! The fallback for every statement kind. Dialect generators reuse the
//! rendering helpers here and override only where their product deviates.

use crate::database::{Database, DatabaseKind};
use crate::error::{MigrateResult, UnsupportedError};
use crate::statement::{ColumnDef, ColumnType, DefaultValue, Statement};

use super::SqlGenerator;

/// How a dialect spells an auto-incrementing column.
#[derive(Debug, Clone, Copy)]
pub(crate) enum AutoIncrementStyle {
    /// The dialect has no way to express it.
    Unsupported,
    /// PostgreSQL-style pseudo types (SERIAL / BIGSERIAL).
    Serial,
    /// A keyword appended to the column definition.
    Suffix(&'static str),
    /// SQLite's `INTEGER PRIMARY KEY AUTOINCREMENT` form, which subsumes
    /// the primary-key clause.
    IntegerPrimaryKey,
}

/// The dialect spelling of a column type.
pub(crate) fn type_sql(kind: DatabaseKind, ty: &ColumnType) -> String {
    use DatabaseKind as Dk;

    match ty {
        ColumnType::Integer => "INTEGER".to_string(),
        ColumnType::BigInt => "BIGINT".to_string(),
        ColumnType::SmallInt => "SMALLINT".to_string(),
        ColumnType::Text => match kind {
            Dk::Mssql => "NVARCHAR(MAX)".to_string(),
            _ => "TEXT".to_string(),
        },
        ColumnType::VarChar(len) => match kind {
            Dk::Mssql => format!("NVARCHAR({len})"),
            _ => format!("VARCHAR({len})"),
        },
        ColumnType::Boolean => match kind {
            Dk::Mssql => "BIT".to_string(),
            _ => "BOOLEAN".to_string(),
        },
        ColumnType::Timestamp => match kind {
            Dk::MySql => "DATETIME".to_string(),
            Dk::Mssql => "DATETIME2".to_string(),
            _ => "TIMESTAMP".to_string(),
        },
        ColumnType::TimestampTz => match kind {
            Dk::Postgres => "TIMESTAMP WITH TIME ZONE".to_string(),
            Dk::MySql => "TIMESTAMP".to_string(),
            Dk::Mssql => "DATETIMEOFFSET".to_string(),
            Dk::Sqlite => "TIMESTAMP".to_string(),
        },
        ColumnType::Date => "DATE".to_string(),
        ColumnType::Time => "TIME".to_string(),
        ColumnType::Uuid => match kind {
            Dk::Postgres => "UUID".to_string(),
            Dk::Mssql => "UNIQUEIDENTIFIER".to_string(),
            _ => "CHAR(36)".to_string(),
        },
        ColumnType::Decimal { precision, scale } => format!("DECIMAL({precision}, {scale})"),
        ColumnType::Real => "REAL".to_string(),
        ColumnType::DoublePrecision => match kind {
            Dk::MySql => "DOUBLE".to_string(),
            _ => "DOUBLE PRECISION".to_string(),
        },
        ColumnType::Binary => match kind {
            Dk::Postgres => "BYTEA".to_string(),
            Dk::Mssql => "VARBINARY(MAX)".to_string(),
            _ => "BLOB".to_string(),
        },
        ColumnType::Custom(raw) => raw.clone(),
    }
}

/// Render a default value as a SQL literal or expression.
pub(crate) fn render_default(database: &Database, default: &DefaultValue) -> String {
    match default {
        DefaultValue::Literal(text) => database.escape_string_literal(text),
        DefaultValue::Numeric(number) => number.clone(),
        DefaultValue::Boolean(flag) => database.boolean_literal(*flag).to_string(),
        DefaultValue::Expression(expr) => expr.clone(),
    }
}

/// Render one column definition.
///
/// `inline_primary_key` is false when the caller renders a table-level
/// PRIMARY KEY constraint instead (composite keys).
pub(crate) fn column_definition(
    database: &Database,
    column: &ColumnDef,
    style: AutoIncrementStyle,
    inline_primary_key: bool,
) -> Result<String, UnsupportedError> {
    let auto_increment = column.is_auto_increment();
    let mut parts = vec![database.quote(&column.name)];
    let mut primary_key_rendered = false;

    if auto_increment {
        match style {
            AutoIncrementStyle::Unsupported => {
                return Err(UnsupportedError::new(
                    "autoIncrement",
                    database.kind().name(),
                ));
            }
            AutoIncrementStyle::Serial => {
                let serial = match column.column_type {
                    ColumnType::Integer => "SERIAL",
                    ColumnType::BigInt => "BIGSERIAL",
                    ColumnType::SmallInt => "SMALLSERIAL",
                    _ => {
                        return Err(UnsupportedError::new(
                            "autoIncrement on a non-integer column",
                            database.kind().name(),
                        ));
                    }
                };
                parts.push(serial.to_string());
            }
            AutoIncrementStyle::Suffix(keyword) => {
                parts.push(type_sql(database.kind(), &column.column_type));
                parts.push(keyword.to_string());
            }
            AutoIncrementStyle::IntegerPrimaryKey => {
                parts.push("INTEGER PRIMARY KEY AUTOINCREMENT".to_string());
                primary_key_rendered = true;
            }
        }
    } else {
        parts.push(type_sql(database.kind(), &column.column_type));
    }

    if column.is_primary_key() && inline_primary_key && !primary_key_rendered {
        parts.push("PRIMARY KEY".to_string());
    }
    if column.is_not_null() && !column.is_primary_key() {
        parts.push("NOT NULL".to_string());
    }
    if column.is_unique() && !column.is_primary_key() {
        parts.push("UNIQUE".to_string());
    }
    if let Some(default) = &column.default {
        parts.push(format!("DEFAULT {}", render_default(database, default)));
    }
    if let Some(fk) = column.foreign_key() {
        parts.push(format!(
            "REFERENCES {} ({})",
            database.quote(&fk.table),
            database.quote(&fk.column)
        ));
    }

    Ok(parts.join(" "))
}

/// Render a CREATE TABLE statement.
pub(crate) fn create_table_sql(
    database: &Database,
    schema: Option<&str>,
    table: &str,
    columns: &[ColumnDef],
    style: AutoIncrementStyle,
) -> Result<String, UnsupportedError> {
    let pk_columns: Vec<&ColumnDef> = columns.iter().filter(|c| c.is_primary_key()).collect();
    let inline_primary_key = pk_columns.len() == 1;

    let mut defs = Vec::with_capacity(columns.len() + 1);
    for column in columns {
        defs.push(column_definition(
            database,
            column,
            style,
            inline_primary_key,
        )?);
    }

    if pk_columns.len() > 1 {
        let names: Vec<String> = pk_columns.iter().map(|c| database.quote(&c.name)).collect();
        defs.push(format!("PRIMARY KEY ({})", names.join(", ")));
    }

    Ok(format!(
        "CREATE TABLE {} (\n    {}\n)",
        database.quote_qualified(schema, table),
        defs.join(",\n    ")
    ))
}

/// Render an ALTER TABLE ... ADD [COLUMN] statement.
pub(crate) fn add_column_sql(
    database: &Database,
    schema: Option<&str>,
    table: &str,
    column: &ColumnDef,
    style: AutoIncrementStyle,
    add_keyword: &str,
) -> Result<String, UnsupportedError> {
    let definition = column_definition(database, column, style, true)?;
    Ok(format!(
        "ALTER TABLE {} {add_keyword} {definition}",
        database.quote_qualified(schema, table)
    ))
}

/// The generic fallback generator.
pub struct AnsiGenerator;

impl SqlGenerator for AnsiGenerator {
    fn validate(&self, statement: &Statement, database: &Database) -> Result<(), UnsupportedError> {
        match statement {
            Statement::CreateTable { columns, .. } => {
                if columns.iter().any(ColumnDef::is_auto_increment) {
                    return Err(UnsupportedError::new(
                        "autoIncrement",
                        database.kind().name(),
                    ));
                }
            }
            Statement::AddColumn { column, .. } => {
                if column.is_auto_increment() {
                    return Err(UnsupportedError::new(
                        "autoIncrement",
                        database.kind().name(),
                    ));
                }
            }
            Statement::CreateSequence { .. }
            | Statement::AlterSequence { .. }
            | Statement::DropSequence { .. } => {
                if !database.capabilities().supports_sequences {
                    return Err(UnsupportedError::new(
                        statement.kind().name(),
                        database.kind().name(),
                    ));
                }
            }
            Statement::DropColumn { .. } => {
                if !database.capabilities().supports_drop_column {
                    return Err(UnsupportedError::new(
                        "dropColumn",
                        database.kind().name(),
                    ));
                }
            }
            Statement::ReorganizeTable { .. } => {
                return Err(UnsupportedError::new(
                    "reorganizeTable",
                    database.kind().name(),
                ));
            }
            _ => {}
        }
        Ok(())
    }

    fn generate(&self, statement: &Statement, database: &Database) -> MigrateResult<Vec<String>> {
        self.validate(statement, database)?;

        let sql = match statement {
            Statement::CreateTable {
                schema,
                table,
                columns,
            } => vec![create_table_sql(
                database,
                schema.as_deref(),
                table,
                columns,
                AutoIncrementStyle::Unsupported,
            )?],
            Statement::DropTable {
                schema,
                table,
                cascade,
            } => {
                let mut sql = format!(
                    "DROP TABLE {}",
                    database.quote_qualified(schema.as_deref(), table)
                );
                if *cascade {
                    sql.push_str(" CASCADE");
                }
                vec![sql]
            }
            Statement::RenameTable { schema, from, to } => vec![format!(
                "ALTER TABLE {} RENAME TO {}",
                database.quote_qualified(schema.as_deref(), from),
                database.quote(to)
            )],
            Statement::AddColumn {
                schema,
                table,
                column,
            } => vec![add_column_sql(
                database,
                schema.as_deref(),
                table,
                column,
                AutoIncrementStyle::Unsupported,
                "ADD COLUMN",
            )?],
            Statement::DropColumn {
                schema,
                table,
                column,
            } => vec![format!(
                "ALTER TABLE {} DROP COLUMN {}",
                database.quote_qualified(schema.as_deref(), table),
                database.quote(column)
            )],
            Statement::RenameColumn {
                schema,
                table,
                from,
                to,
            } => vec![format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                database.quote_qualified(schema.as_deref(), table),
                database.quote(from),
                database.quote(to)
            )],
            Statement::AddUniqueConstraint {
                schema,
                table,
                name,
                columns,
            } => {
                let cols: Vec<String> = columns.iter().map(|c| database.quote(c)).collect();
                vec![format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
                    database.quote_qualified(schema.as_deref(), table),
                    database.quote(name),
                    cols.join(", ")
                )]
            }
            Statement::DropUniqueConstraint {
                schema,
                table,
                name,
            }
            | Statement::DropForeignKey {
                schema,
                table,
                name,
            } => vec![format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                database.quote_qualified(schema.as_deref(), table),
                database.quote(name)
            )],
            Statement::AddForeignKey {
                schema,
                table,
                name,
                columns,
                ref_table,
                ref_columns,
                on_delete,
                on_update,
            } => {
                let cols: Vec<String> = columns.iter().map(|c| database.quote(c)).collect();
                let ref_cols: Vec<String> =
                    ref_columns.iter().map(|c| database.quote(c)).collect();
                let mut sql = format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                    database.quote_qualified(schema.as_deref(), table),
                    database.quote(name),
                    cols.join(", "),
                    database.quote(ref_table),
                    ref_cols.join(", ")
                );
                if let Some(action) = on_delete {
                    sql.push_str(&format!(" ON DELETE {}", action.as_sql()));
                }
                if let Some(action) = on_update {
                    sql.push_str(&format!(" ON UPDATE {}", action.as_sql()));
                }
                vec![sql]
            }
            Statement::CreateIndex {
                schema,
                table,
                name,
                columns,
                unique,
            } => {
                let cols: Vec<String> = columns.iter().map(|c| database.quote(c)).collect();
                let unique_kw = if *unique { "UNIQUE " } else { "" };
                vec![format!(
                    "CREATE {unique_kw}INDEX {} ON {} ({})",
                    database.quote(name),
                    database.quote_qualified(schema.as_deref(), table),
                    cols.join(", ")
                )]
            }
            Statement::DropIndex { name, .. } => {
                vec![format!("DROP INDEX {}", database.quote(name))]
            }
            Statement::CreateView {
                schema,
                view,
                definition,
                replace,
            } => {
                let qualified = database.quote_qualified(schema.as_deref(), view);
                if *replace && database.capabilities().supports_create_or_replace_view {
                    vec![format!("CREATE OR REPLACE VIEW {qualified} AS {definition}")]
                } else if *replace {
                    vec![
                        format!("DROP VIEW IF EXISTS {qualified}"),
                        format!("CREATE VIEW {qualified} AS {definition}"),
                    ]
                } else {
                    vec![format!("CREATE VIEW {qualified} AS {definition}")]
                }
            }
            Statement::DropView { schema, view } => vec![format!(
                "DROP VIEW {}",
                database.quote_qualified(schema.as_deref(), view)
            )],
            Statement::CreateSequence {
                schema,
                sequence,
                start,
                increment,
            } => {
                let mut sql = format!(
                    "CREATE SEQUENCE {}",
                    database.quote_qualified(schema.as_deref(), sequence)
                );
                if let Some(start) = start {
                    sql.push_str(&format!(" START WITH {start}"));
                }
                if let Some(increment) = increment {
                    sql.push_str(&format!(" INCREMENT BY {increment}"));
                }
                vec![sql]
            }
            Statement::AlterSequence {
                schema,
                sequence,
                increment,
                restart_with,
            } => {
                let mut sql = format!(
                    "ALTER SEQUENCE {}",
                    database.quote_qualified(schema.as_deref(), sequence)
                );
                if let Some(increment) = increment {
                    sql.push_str(&format!(" INCREMENT BY {increment}"));
                }
                if let Some(restart) = restart_with {
                    sql.push_str(&format!(" RESTART WITH {restart}"));
                }
                vec![sql]
            }
            Statement::DropSequence { schema, sequence } => vec![format!(
                "DROP SEQUENCE {}",
                database.quote_qualified(schema.as_deref(), sequence)
            )],
            Statement::SetNullable {
                schema,
                table,
                column,
                nullable,
                ..
            } => {
                let action = if *nullable { "DROP" } else { "SET" };
                vec![format!(
                    "ALTER TABLE {} ALTER COLUMN {} {action} NOT NULL",
                    database.quote_qualified(schema.as_deref(), table),
                    database.quote(column)
                )]
            }
            Statement::SetDefaultValue {
                schema,
                table,
                column,
                default,
            } => vec![format!(
                "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                database.quote_qualified(schema.as_deref(), table),
                database.quote(column),
                render_default(database, default)
            )],
            Statement::DropDefaultValue {
                schema,
                table,
                column,
            } => vec![format!(
                "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
                database.quote_qualified(schema.as_deref(), table),
                database.quote(column)
            )],
            Statement::Update {
                schema,
                table,
                column,
                value,
                where_clause,
            } => {
                let mut sql = format!(
                    "UPDATE {} SET {} = {}",
                    database.quote_qualified(schema.as_deref(), table),
                    database.quote(column),
                    render_default(database, value)
                );
                if let Some(clause) = where_clause {
                    sql.push_str(&format!(" WHERE {clause}"));
                }
                vec![sql]
            }
            // Rejected by validate above.
            Statement::ReorganizeTable { .. } => unreachable!("validated"),
            Statement::RawSql { sql } => vec![sql.clone()],
        };

        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryConnection;
    use crate::statement::ReferentialAction;

    fn db(kind: DatabaseKind) -> Database {
        Database::new(kind, Box::new(MemoryConnection::new()))
    }

    fn generate(statement: &Statement, kind: DatabaseKind) -> Vec<String> {
        AnsiGenerator.generate(statement, &db(kind)).unwrap()
    }

    #[test]
    fn test_create_table_single_pk_inline() {
        let stmt = Statement::CreateTable {
            schema: None,
            table: "users".to_string(),
            columns: vec![
                ColumnDef::new("id", ColumnType::BigInt).primary_key(),
                ColumnDef::new("email", ColumnType::VarChar(255)).not_null().unique(),
            ],
        };

        let sql = generate(&stmt, DatabaseKind::Postgres);
        assert_eq!(sql.len(), 1);
        assert!(sql[0].contains("id BIGINT PRIMARY KEY"));
        assert!(sql[0].contains("email VARCHAR(255) NOT NULL UNIQUE"));
    }

    #[test]
    fn test_create_table_composite_pk() {
        let stmt = Statement::CreateTable {
            schema: None,
            table: "memberships".to_string(),
            columns: vec![
                ColumnDef::new("user_id", ColumnType::BigInt).primary_key(),
                ColumnDef::new("org_id", ColumnType::BigInt).primary_key(),
            ],
        };

        let sql = generate(&stmt, DatabaseKind::Postgres);
        assert!(sql[0].contains("PRIMARY KEY (user_id, org_id)"));
        assert!(!sql[0].contains("user_id BIGINT PRIMARY KEY,"));
    }

    #[test]
    fn test_add_column_with_default() {
        let stmt = Statement::AddColumn {
            schema: None,
            table: "users".to_string(),
            column: ColumnDef::new("active", ColumnType::Boolean)
                .default_value(DefaultValue::Boolean(true)),
        };

        let sql = generate(&stmt, DatabaseKind::Postgres);
        assert_eq!(
            sql,
            vec!["ALTER TABLE users ADD COLUMN active BOOLEAN DEFAULT TRUE"]
        );
    }

    #[test]
    fn test_auto_increment_rejected_without_dialect() {
        let stmt = Statement::AddColumn {
            schema: None,
            table: "users".to_string(),
            column: ColumnDef::new("id", ColumnType::Integer).auto_increment(),
        };

        // The fallback has no auto-increment spelling; dialects override.
        let err = AnsiGenerator
            .validate(&stmt, &db(DatabaseKind::Postgres))
            .unwrap_err();
        assert!(err.to_string().contains("autoIncrement"));
    }

    #[test]
    fn test_foreign_key_with_actions() {
        let stmt = Statement::AddForeignKey {
            schema: None,
            table: "posts".to_string(),
            name: "fk_posts_author".to_string(),
            columns: vec!["author_id".to_string()],
            ref_table: "users".to_string(),
            ref_columns: vec!["id".to_string()],
            on_delete: Some(ReferentialAction::Cascade),
            on_update: None,
        };

        let sql = generate(&stmt, DatabaseKind::Postgres);
        assert!(sql[0].contains("FOREIGN KEY (author_id) REFERENCES users (id)"));
        assert!(sql[0].ends_with("ON DELETE CASCADE"));
    }

    #[test]
    fn test_create_view_replace_without_capability() {
        let stmt = Statement::CreateView {
            schema: None,
            view: "active_users".to_string(),
            definition: "SELECT * FROM users WHERE active".to_string(),
            replace: true,
        };

        // SQLite has no OR REPLACE; the generator degrades to drop+create.
        let sql = generate(&stmt, DatabaseKind::Sqlite);
        assert_eq!(sql.len(), 2);
        assert!(sql[0].starts_with("DROP VIEW IF EXISTS"));

        let sql = generate(&stmt, DatabaseKind::Postgres);
        assert_eq!(sql.len(), 1);
        assert!(sql[0].starts_with("CREATE OR REPLACE VIEW"));
    }

    #[test]
    fn test_sequences_gated_by_capability() {
        let stmt = Statement::CreateSequence {
            schema: None,
            sequence: "user_seq".to_string(),
            start: Some(100),
            increment: Some(5),
        };

        let sql = generate(&stmt, DatabaseKind::Postgres);
        assert_eq!(sql, vec!["CREATE SEQUENCE user_seq START WITH 100 INCREMENT BY 5"]);

        assert!(AnsiGenerator
            .validate(&stmt, &db(DatabaseKind::Sqlite))
            .is_err());
    }

    #[test]
    fn test_reserved_identifiers_are_quoted() {
        let stmt = Statement::DropTable {
            schema: None,
            table: "order".to_string(),
            cascade: true,
        };

        let sql = generate(&stmt, DatabaseKind::Postgres);
        assert_eq!(sql, vec!["DROP TABLE \"order\" CASCADE"]);
    }

    #[test]
    fn test_update_with_where_clause() {
        let stmt = Statement::Update {
            schema: None,
            table: "users".to_string(),
            column: "active".to_string(),
            value: DefaultValue::Boolean(false),
            where_clause: Some("last_login IS NULL".to_string()),
        };

        let sql = generate(&stmt, DatabaseKind::Postgres);
        assert_eq!(
            sql,
            vec!["UPDATE users SET active = FALSE WHERE last_login IS NULL"]
        );
    }

    #[test]
    fn test_string_default_escaping() {
        let stmt = Statement::SetDefaultValue {
            schema: None,
            table: "users".to_string(),
            column: "name".to_string(),
            default: DefaultValue::Literal("O'Brien".to_string()),
        };

        let sql = generate(&stmt, DatabaseKind::Postgres);
        assert!(sql[0].ends_with("SET DEFAULT 'O''Brien'"));
    }
}
