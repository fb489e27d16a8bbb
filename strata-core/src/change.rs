//! The change model.
//!
//! A [`Change`] is one named structural operation within a change set. It
//! produces dialect-neutral [`Statement`]s for a target database, derives
//! its inverse for rollback where one exists, and carries its own
//! validation. Statement generation is a pure function of the change's
//! fields and the database's capabilities.

use crate::database::Database;
use crate::error::MigrateResult;
use crate::statement::{
    ColumnDef, ColumnType, DefaultValue, ReferentialAction, Statement,
};

/// Whether and how a change can be rolled back.
///
/// `Supported(vec![])` is a legitimate no-op rollback; an impossible
/// rollback is always the explicit `Unsupported` case, never an empty list.
#[derive(Debug, Clone)]
pub enum RollbackSupport {
    /// Inverse changes, to be applied in the given order.
    Supported(Vec<Change>),
    /// No safe inverse exists; the reason is reported to the caller.
    Unsupported(&'static str),
}

impl RollbackSupport {
    /// Whether an inverse exists.
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::Supported(_))
    }
}

/// Kind of a database object named by a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Table,
    Column,
    Index,
    View,
    Sequence,
    Constraint,
}

/// A database object a change touches. Used for documentation and
/// dependency reporting, not for SQL generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    /// What kind of object.
    pub kind: ObjectKind,
    /// Its name; columns are `table.column`.
    pub name: String,
}

impl ObjectRef {
    fn new(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            ObjectKind::Table => "table",
            ObjectKind::Column => "column",
            ObjectKind::Index => "index",
            ObjectKind::View => "view",
            ObjectKind::Sequence => "sequence",
            ObjectKind::Constraint => "constraint",
        };
        write!(f, "{kind} {}", self.name)
    }
}

/// One structural operation within a change set.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Create a table.
    CreateTable {
        schema: Option<String>,
        table: String,
        columns: Vec<ColumnDef>,
    },
    /// Drop a table.
    DropTable {
        schema: Option<String>,
        table: String,
        cascade: bool,
    },
    /// Rename a table.
    RenameTable {
        schema: Option<String>,
        from: String,
        to: String,
    },
    /// Add one or more columns to a table.
    AddColumn {
        schema: Option<String>,
        table: String,
        columns: Vec<ColumnDef>,
    },
    /// Drop a column.
    DropColumn {
        schema: Option<String>,
        table: String,
        column: String,
    },
    /// Rename a column.
    RenameColumn {
        schema: Option<String>,
        table: String,
        from: String,
        to: String,
    },
    /// Create an index.
    CreateIndex {
        schema: Option<String>,
        table: String,
        index: String,
        columns: Vec<String>,
        unique: bool,
    },
    /// Drop an index.
    DropIndex {
        schema: Option<String>,
        table: String,
        index: String,
    },
    /// Add a named unique constraint.
    AddUniqueConstraint {
        schema: Option<String>,
        table: String,
        name: String,
        columns: Vec<String>,
    },
    /// Drop a named unique constraint.
    DropUniqueConstraint {
        schema: Option<String>,
        table: String,
        name: String,
    },
    /// Add a named foreign key constraint.
    AddForeignKey {
        schema: Option<String>,
        table: String,
        name: String,
        columns: Vec<String>,
        ref_table: String,
        ref_columns: Vec<String>,
        on_delete: Option<ReferentialAction>,
        on_update: Option<ReferentialAction>,
    },
    /// Drop a named foreign key constraint.
    DropForeignKey {
        schema: Option<String>,
        table: String,
        name: String,
    },
    /// Create (or replace) a view.
    CreateView {
        schema: Option<String>,
        view: String,
        definition: String,
        replace: bool,
    },
    /// Drop a view.
    DropView {
        schema: Option<String>,
        view: String,
    },
    /// Create a sequence.
    CreateSequence {
        schema: Option<String>,
        sequence: String,
        start: Option<i64>,
        increment: Option<i64>,
    },
    /// Alter a sequence.
    AlterSequence {
        schema: Option<String>,
        sequence: String,
        increment: Option<i64>,
        restart_with: Option<i64>,
    },
    /// Drop a sequence.
    DropSequence {
        schema: Option<String>,
        sequence: String,
    },
    /// Make a column NOT NULL, optionally backfilling NULL rows first.
    AddNotNull {
        schema: Option<String>,
        table: String,
        column: String,
        column_type: Option<ColumnType>,
        default_for_existing: Option<DefaultValue>,
    },
    /// Make a column nullable.
    DropNotNull {
        schema: Option<String>,
        table: String,
        column: String,
        column_type: Option<ColumnType>,
    },
    /// Set a column default.
    AddDefaultValue {
        schema: Option<String>,
        table: String,
        column: String,
        default: DefaultValue,
    },
    /// Drop a column default.
    DropDefaultValue {
        schema: Option<String>,
        table: String,
        column: String,
    },
    /// Raw SQL with an optional explicit rollback statement.
    Sql {
        sql: String,
        rollback: Option<String>,
    },
    /// Data update: set one column across existing rows.
    Update {
        schema: Option<String>,
        table: String,
        column: String,
        value: DefaultValue,
        where_clause: Option<String>,
    },
}

impl Change {
    /// The change-kind name, as written in changelogs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::CreateTable { .. } => "createTable",
            Self::DropTable { .. } => "dropTable",
            Self::RenameTable { .. } => "renameTable",
            Self::AddColumn { .. } => "addColumn",
            Self::DropColumn { .. } => "dropColumn",
            Self::RenameColumn { .. } => "renameColumn",
            Self::CreateIndex { .. } => "createIndex",
            Self::DropIndex { .. } => "dropIndex",
            Self::AddUniqueConstraint { .. } => "addUniqueConstraint",
            Self::DropUniqueConstraint { .. } => "dropUniqueConstraint",
            Self::AddForeignKey { .. } => "addForeignKeyConstraint",
            Self::DropForeignKey { .. } => "dropForeignKeyConstraint",
            Self::CreateView { .. } => "createView",
            Self::DropView { .. } => "dropView",
            Self::CreateSequence { .. } => "createSequence",
            Self::AlterSequence { .. } => "alterSequence",
            Self::DropSequence { .. } => "dropSequence",
            Self::AddNotNull { .. } => "addNotNullConstraint",
            Self::DropNotNull { .. } => "dropNotNullConstraint",
            Self::AddDefaultValue { .. } => "addDefaultValue",
            Self::DropDefaultValue { .. } => "dropDefaultValue",
            Self::Sql { .. } => "sql",
            Self::Update { .. } => "update",
        }
    }

    /// A short human description, e.g. for ledger rows and logs.
    pub fn description(&self) -> String {
        let target = match self {
            Self::CreateTable { table, .. }
            | Self::DropTable { table, .. }
            | Self::AddColumn { table, .. }
            | Self::DropColumn { table, .. }
            | Self::RenameColumn { table, .. }
            | Self::CreateIndex { table, .. }
            | Self::DropIndex { table, .. }
            | Self::AddUniqueConstraint { table, .. }
            | Self::DropUniqueConstraint { table, .. }
            | Self::AddForeignKey { table, .. }
            | Self::DropForeignKey { table, .. }
            | Self::AddNotNull { table, .. }
            | Self::DropNotNull { table, .. }
            | Self::AddDefaultValue { table, .. }
            | Self::DropDefaultValue { table, .. }
            | Self::Update { table, .. } => table.as_str(),
            Self::RenameTable { from, .. } => from.as_str(),
            Self::CreateView { view, .. } | Self::DropView { view, .. } => view.as_str(),
            Self::CreateSequence { sequence, .. }
            | Self::AlterSequence { sequence, .. }
            | Self::DropSequence { sequence, .. } => sequence.as_str(),
            Self::Sql { .. } => return "sql".to_string(),
        };
        format!("{} {target}", self.kind_name())
    }

    /// The content entering the change set checksum. The derived debug form
    /// is deterministic over the change's fields; checksum versioning covers
    /// any evolution of this representation.
    pub(crate) fn checksum_component(&self) -> String {
        format!("{self:?}")
    }

    /// Database objects this change touches.
    pub fn affected_objects(&self) -> Vec<ObjectRef> {
        use ObjectKind as K;

        match self {
            Self::CreateTable { table, columns, .. } => {
                let mut refs = vec![ObjectRef::new(K::Table, table)];
                refs.extend(
                    columns
                        .iter()
                        .map(|c| ObjectRef::new(K::Column, format!("{table}.{}", c.name))),
                );
                refs
            }
            Self::DropTable { table, .. } => vec![ObjectRef::new(K::Table, table)],
            Self::RenameTable { from, to, .. } => vec![
                ObjectRef::new(K::Table, from),
                ObjectRef::new(K::Table, to),
            ],
            Self::AddColumn { table, columns, .. } => {
                let mut refs = vec![ObjectRef::new(K::Table, table)];
                refs.extend(
                    columns
                        .iter()
                        .map(|c| ObjectRef::new(K::Column, format!("{table}.{}", c.name))),
                );
                refs
            }
            Self::DropColumn { table, column, .. }
            | Self::AddNotNull { table, column, .. }
            | Self::DropNotNull { table, column, .. }
            | Self::AddDefaultValue { table, column, .. }
            | Self::DropDefaultValue { table, column, .. }
            | Self::Update { table, column, .. } => vec![
                ObjectRef::new(K::Table, table),
                ObjectRef::new(K::Column, format!("{table}.{column}")),
            ],
            Self::RenameColumn {
                table, from, to, ..
            } => vec![
                ObjectRef::new(K::Table, table),
                ObjectRef::new(K::Column, format!("{table}.{from}")),
                ObjectRef::new(K::Column, format!("{table}.{to}")),
            ],
            Self::CreateIndex { table, index, .. } | Self::DropIndex { table, index, .. } => vec![
                ObjectRef::new(K::Table, table),
                ObjectRef::new(K::Index, index),
            ],
            Self::AddUniqueConstraint { table, name, .. }
            | Self::DropUniqueConstraint { table, name, .. }
            | Self::DropForeignKey { table, name, .. } => vec![
                ObjectRef::new(K::Table, table),
                ObjectRef::new(K::Constraint, name),
            ],
            Self::AddForeignKey {
                table,
                name,
                ref_table,
                ..
            } => vec![
                ObjectRef::new(K::Table, table),
                ObjectRef::new(K::Table, ref_table),
                ObjectRef::new(K::Constraint, name),
            ],
            Self::CreateView { view, .. } | Self::DropView { view, .. } => {
                vec![ObjectRef::new(K::View, view)]
            }
            Self::CreateSequence { sequence, .. }
            | Self::AlterSequence { sequence, .. }
            | Self::DropSequence { sequence, .. } => {
                vec![ObjectRef::new(K::Sequence, sequence)]
            }
            Self::Sql { .. } => Vec::new(),
        }
    }

    /// Validate this change against a target database, returning every
    /// problem found rather than stopping at the first.
    pub fn validate(&self, database: &Database) -> Vec<String> {
        let mut issues = Vec::new();

        match self {
            Self::CreateTable { columns, .. } | Self::AddColumn { columns, .. }
                if columns.is_empty() =>
            {
                issues.push(format!("{} requires at least one column", self.kind_name()));
            }
            Self::AddUniqueConstraint { columns, .. } | Self::CreateIndex { columns, .. }
                if columns.is_empty() =>
            {
                issues.push(format!("{} requires at least one column", self.kind_name()));
            }
            Self::AddForeignKey {
                columns,
                ref_columns,
                ..
            } if columns.len() != ref_columns.len() || columns.is_empty() => {
                issues.push(
                    "addForeignKeyConstraint requires matching referencing and referenced columns"
                        .to_string(),
                );
            }
            Self::Sql { sql, .. } if sql.trim().is_empty() => {
                issues.push("sql change has an empty statement".to_string());
            }
            Self::AlterSequence {
                increment: None,
                restart_with: None,
                ..
            } => {
                issues.push("alterSequence changes nothing".to_string());
            }
            _ => {}
        }

        let max_len = database.capabilities().max_identifier_length;
        for object in self.affected_objects() {
            let bare = object.name.rsplit('.').next().unwrap_or(&object.name);
            if bare.len() > max_len {
                issues.push(format!(
                    "identifier '{bare}' exceeds the {max_len}-character limit of {}",
                    database.kind()
                ));
            }
        }

        issues
    }

    /// Generate the forward statements for a target database.
    pub fn generate_statements(&self, database: &Database) -> MigrateResult<Vec<Statement>> {
        let statements = match self {
            Self::CreateTable {
                schema,
                table,
                columns,
            } => vec![Statement::CreateTable {
                schema: schema.clone(),
                table: table.clone(),
                columns: columns.clone(),
            }],
            Self::DropTable {
                schema,
                table,
                cascade,
            } => vec![Statement::DropTable {
                schema: schema.clone(),
                table: table.clone(),
                cascade: *cascade,
            }],
            Self::RenameTable { schema, from, to } => vec![Statement::RenameTable {
                schema: schema.clone(),
                from: from.clone(),
                to: to.clone(),
            }],
            Self::AddColumn {
                schema,
                table,
                columns,
            } => {
                let mut statements = Vec::new();
                let mut needs_reorg = false;

                for column in columns {
                    statements.push(Statement::AddColumn {
                        schema: schema.clone(),
                        table: table.clone(),
                        column: column.clone(),
                    });

                    // A default on a fresh column must reach rows that
                    // already exist.
                    if let Some(default) = &column.default {
                        statements.push(Statement::Update {
                            schema: schema.clone(),
                            table: table.clone(),
                            column: column.name.clone(),
                            value: default.clone(),
                            where_clause: Some(format!("{} IS NULL", column.name)),
                        });
                        if database.capabilities().requires_reorg_after_add_default {
                            needs_reorg = true;
                        }
                    }
                }

                if needs_reorg {
                    statements.push(Statement::ReorganizeTable {
                        schema: schema.clone(),
                        table: table.clone(),
                    });
                }

                statements
            }
            Self::DropColumn {
                schema,
                table,
                column,
            } => vec![Statement::DropColumn {
                schema: schema.clone(),
                table: table.clone(),
                column: column.clone(),
            }],
            Self::RenameColumn {
                schema,
                table,
                from,
                to,
            } => vec![Statement::RenameColumn {
                schema: schema.clone(),
                table: table.clone(),
                from: from.clone(),
                to: to.clone(),
            }],
            Self::CreateIndex {
                schema,
                table,
                index,
                columns,
                unique,
            } => vec![Statement::CreateIndex {
                schema: schema.clone(),
                table: table.clone(),
                name: index.clone(),
                columns: columns.clone(),
                unique: *unique,
            }],
            Self::DropIndex {
                schema,
                table,
                index,
            } => vec![Statement::DropIndex {
                schema: schema.clone(),
                table: table.clone(),
                name: index.clone(),
            }],
            Self::AddUniqueConstraint {
                schema,
                table,
                name,
                columns,
            } => vec![Statement::AddUniqueConstraint {
                schema: schema.clone(),
                table: table.clone(),
                name: name.clone(),
                columns: columns.clone(),
            }],
            Self::DropUniqueConstraint {
                schema,
                table,
                name,
            } => vec![Statement::DropUniqueConstraint {
                schema: schema.clone(),
                table: table.clone(),
                name: name.clone(),
            }],
            Self::AddForeignKey {
                schema,
                table,
                name,
                columns,
                ref_table,
                ref_columns,
                on_delete,
                on_update,
            } => vec![Statement::AddForeignKey {
                schema: schema.clone(),
                table: table.clone(),
                name: name.clone(),
                columns: columns.clone(),
                ref_table: ref_table.clone(),
                ref_columns: ref_columns.clone(),
                on_delete: *on_delete,
                on_update: *on_update,
            }],
            Self::DropForeignKey {
                schema,
                table,
                name,
            } => vec![Statement::DropForeignKey {
                schema: schema.clone(),
                table: table.clone(),
                name: name.clone(),
            }],
            Self::CreateView {
                schema,
                view,
                definition,
                replace,
            } => vec![Statement::CreateView {
                schema: schema.clone(),
                view: view.clone(),
                definition: definition.clone(),
                replace: *replace,
            }],
            Self::DropView { schema, view } => vec![Statement::DropView {
                schema: schema.clone(),
                view: view.clone(),
            }],
            Self::CreateSequence {
                schema,
                sequence,
                start,
                increment,
            } => vec![Statement::CreateSequence {
                schema: schema.clone(),
                sequence: sequence.clone(),
                start: *start,
                increment: *increment,
            }],
            Self::AlterSequence {
                schema,
                sequence,
                increment,
                restart_with,
            } => vec![Statement::AlterSequence {
                schema: schema.clone(),
                sequence: sequence.clone(),
                increment: *increment,
                restart_with: *restart_with,
            }],
            Self::DropSequence { schema, sequence } => vec![Statement::DropSequence {
                schema: schema.clone(),
                sequence: sequence.clone(),
            }],
            Self::AddNotNull {
                schema,
                table,
                column,
                column_type,
                default_for_existing,
            } => {
                let mut statements = Vec::new();
                // Backfill first, or the constraint fails on existing NULLs.
                if let Some(default) = default_for_existing {
                    statements.push(Statement::Update {
                        schema: schema.clone(),
                        table: table.clone(),
                        column: column.clone(),
                        value: default.clone(),
                        where_clause: Some(format!("{column} IS NULL")),
                    });
                }
                statements.push(Statement::SetNullable {
                    schema: schema.clone(),
                    table: table.clone(),
                    column: column.clone(),
                    column_type: column_type.clone(),
                    nullable: false,
                });
                statements
            }
            Self::DropNotNull {
                schema,
                table,
                column,
                column_type,
            } => vec![Statement::SetNullable {
                schema: schema.clone(),
                table: table.clone(),
                column: column.clone(),
                column_type: column_type.clone(),
                nullable: true,
            }],
            Self::AddDefaultValue {
                schema,
                table,
                column,
                default,
            } => vec![Statement::SetDefaultValue {
                schema: schema.clone(),
                table: table.clone(),
                column: column.clone(),
                default: default.clone(),
            }],
            Self::DropDefaultValue {
                schema,
                table,
                column,
            } => vec![Statement::DropDefaultValue {
                schema: schema.clone(),
                table: table.clone(),
                column: column.clone(),
            }],
            Self::Sql { sql, .. } => vec![Statement::RawSql { sql: sql.clone() }],
            Self::Update {
                schema,
                table,
                column,
                value,
                where_clause,
            } => vec![Statement::Update {
                schema: schema.clone(),
                table: table.clone(),
                column: column.clone(),
                value: value.clone(),
                where_clause: where_clause.clone(),
            }],
        };

        Ok(statements)
    }

    /// Derive the inverse changes. The inverse is structural only; data
    /// changes and destructive drops report `Unsupported` rather than
    /// pretending an empty inverse is a rollback.
    pub fn create_inverses(&self) -> RollbackSupport {
        match self {
            Self::CreateTable { schema, table, .. } => {
                RollbackSupport::Supported(vec![Self::DropTable {
                    schema: schema.clone(),
                    table: table.clone(),
                    cascade: false,
                }])
            }
            Self::AddColumn {
                schema,
                table,
                columns,
            } => RollbackSupport::Supported(
                columns
                    .iter()
                    .rev()
                    .map(|column| Self::DropColumn {
                        schema: schema.clone(),
                        table: table.clone(),
                        column: column.name.clone(),
                    })
                    .collect(),
            ),
            Self::RenameTable { schema, from, to } => {
                RollbackSupport::Supported(vec![Self::RenameTable {
                    schema: schema.clone(),
                    from: to.clone(),
                    to: from.clone(),
                }])
            }
            Self::RenameColumn {
                schema,
                table,
                from,
                to,
            } => RollbackSupport::Supported(vec![Self::RenameColumn {
                schema: schema.clone(),
                table: table.clone(),
                from: to.clone(),
                to: from.clone(),
            }]),
            Self::CreateIndex {
                schema,
                table,
                index,
                ..
            } => RollbackSupport::Supported(vec![Self::DropIndex {
                schema: schema.clone(),
                table: table.clone(),
                index: index.clone(),
            }]),
            Self::AddUniqueConstraint {
                schema,
                table,
                name,
                ..
            } => RollbackSupport::Supported(vec![Self::DropUniqueConstraint {
                schema: schema.clone(),
                table: table.clone(),
                name: name.clone(),
            }]),
            Self::AddForeignKey {
                schema,
                table,
                name,
                ..
            } => RollbackSupport::Supported(vec![Self::DropForeignKey {
                schema: schema.clone(),
                table: table.clone(),
                name: name.clone(),
            }]),
            Self::CreateView { schema, view, .. } => {
                RollbackSupport::Supported(vec![Self::DropView {
                    schema: schema.clone(),
                    view: view.clone(),
                }])
            }
            Self::CreateSequence {
                schema, sequence, ..
            } => RollbackSupport::Supported(vec![Self::DropSequence {
                schema: schema.clone(),
                sequence: sequence.clone(),
            }]),
            Self::AddNotNull {
                schema,
                table,
                column,
                column_type,
                ..
            } => RollbackSupport::Supported(vec![Self::DropNotNull {
                schema: schema.clone(),
                table: table.clone(),
                column: column.clone(),
                column_type: column_type.clone(),
            }]),
            Self::DropNotNull {
                schema,
                table,
                column,
                column_type,
            } => RollbackSupport::Supported(vec![Self::AddNotNull {
                schema: schema.clone(),
                table: table.clone(),
                column: column.clone(),
                column_type: column_type.clone(),
                default_for_existing: None,
            }]),
            Self::AddDefaultValue {
                schema,
                table,
                column,
                ..
            } => RollbackSupport::Supported(vec![Self::DropDefaultValue {
                schema: schema.clone(),
                table: table.clone(),
                column: column.clone(),
            }]),
            Self::Sql {
                rollback: Some(rollback),
                ..
            } => RollbackSupport::Supported(vec![Self::Sql {
                sql: rollback.clone(),
                rollback: None,
            }]),

            Self::DropTable { .. } => {
                RollbackSupport::Unsupported("a dropped table cannot be restored")
            }
            Self::DropColumn { .. } => {
                RollbackSupport::Unsupported("a dropped column cannot be restored")
            }
            Self::DropIndex { .. } => {
                RollbackSupport::Unsupported("the dropped index definition is not recorded")
            }
            Self::DropUniqueConstraint { .. } | Self::DropForeignKey { .. } => {
                RollbackSupport::Unsupported("the dropped constraint definition is not recorded")
            }
            Self::DropView { .. } => {
                RollbackSupport::Unsupported("the dropped view definition is not recorded")
            }
            Self::DropSequence { .. } => {
                RollbackSupport::Unsupported("the dropped sequence state is not recorded")
            }
            Self::AlterSequence { .. } => {
                RollbackSupport::Unsupported("the previous sequence state is not recorded")
            }
            Self::DropDefaultValue { .. } => {
                RollbackSupport::Unsupported("the previous default value is not recorded")
            }
            Self::Sql { rollback: None, .. } => {
                RollbackSupport::Unsupported("sql change declares no rollback statement")
            }
            Self::Update { .. } => {
                RollbackSupport::Unsupported("data updates have no structural inverse")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Capabilities, DatabaseKind, MemoryConnection};
    use crate::statement::StatementKind;

    fn db(kind: DatabaseKind) -> Database {
        Database::new(kind, Box::new(MemoryConnection::new()))
    }

    #[test]
    fn test_add_column_with_default_emits_update() {
        let change = Change::AddColumn {
            schema: None,
            table: "users".to_string(),
            columns: vec![ColumnDef::new("active", ColumnType::Boolean)
                .default_value(DefaultValue::Boolean(true))],
        };

        let statements = change
            .generate_statements(&db(DatabaseKind::Postgres))
            .unwrap();
        let kinds: Vec<StatementKind> = statements.iter().map(Statement::kind).collect();
        assert_eq!(kinds, vec![StatementKind::AddColumn, StatementKind::Update]);
    }

    #[test]
    fn test_add_column_reorg_dialect_appends_reorganize() {
        let mut capabilities = Capabilities::for_kind(DatabaseKind::Mssql);
        capabilities.requires_reorg_after_add_default = true;
        let database = db(DatabaseKind::Mssql).with_capabilities(capabilities);

        let change = Change::AddColumn {
            schema: None,
            table: "users".to_string(),
            columns: vec![ColumnDef::new("active", ColumnType::Boolean)
                .default_value(DefaultValue::Boolean(true))],
        };

        let statements = change.generate_statements(&database).unwrap();
        assert_eq!(
            statements.last().map(Statement::kind),
            Some(StatementKind::ReorganizeTable)
        );
    }

    #[test]
    fn test_add_column_without_default_is_single_statement() {
        let change = Change::AddColumn {
            schema: None,
            table: "users".to_string(),
            columns: vec![ColumnDef::new("nickname", ColumnType::Text)],
        };

        let statements = change
            .generate_statements(&db(DatabaseKind::Postgres))
            .unwrap();
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn test_add_column_inverse_drops_each_column() {
        let change = Change::AddColumn {
            schema: None,
            table: "users".to_string(),
            columns: vec![
                ColumnDef::new("a", ColumnType::Integer),
                ColumnDef::new("b", ColumnType::Integer),
            ],
        };

        match change.create_inverses() {
            RollbackSupport::Supported(inverses) => {
                assert_eq!(inverses.len(), 2);
                // Reverse of declaration order.
                assert!(matches!(
                    &inverses[0],
                    Change::DropColumn { column, .. } if column == "b"
                ));
            }
            RollbackSupport::Unsupported(reason) => panic!("unexpected: {reason}"),
        }
    }

    #[test]
    fn test_update_has_no_inverse() {
        let change = Change::Update {
            schema: None,
            table: "users".to_string(),
            column: "active".to_string(),
            value: DefaultValue::Boolean(false),
            where_clause: None,
        };

        // Explicitly unsupported, not an empty no-op.
        assert!(!change.create_inverses().is_supported());
    }

    #[test]
    fn test_sql_inverse_follows_declared_rollback() {
        let with = Change::Sql {
            sql: "CREATE TABLE t (id INT)".to_string(),
            rollback: Some("DROP TABLE t".to_string()),
        };
        assert!(with.create_inverses().is_supported());

        let without = Change::Sql {
            sql: "CREATE TABLE t (id INT)".to_string(),
            rollback: None,
        };
        assert!(!without.create_inverses().is_supported());
    }

    #[test]
    fn test_rename_inverse_swaps_names() {
        let change = Change::RenameColumn {
            schema: None,
            table: "users".to_string(),
            from: "name".to_string(),
            to: "full_name".to_string(),
        };

        match change.create_inverses() {
            RollbackSupport::Supported(inverses) => {
                assert!(matches!(
                    &inverses[0],
                    Change::RenameColumn { from, to, .. } if from == "full_name" && to == "name"
                ));
            }
            RollbackSupport::Unsupported(reason) => panic!("unexpected: {reason}"),
        }
    }

    #[test]
    fn test_validate_collects_all_issues() {
        let change = Change::CreateTable {
            schema: None,
            table: "x".repeat(80),
            columns: vec![],
        };

        let issues = change.validate(&db(DatabaseKind::Postgres));
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().any(|i| i.contains("at least one column")));
        assert!(issues.iter().any(|i| i.contains("63-character limit")));
    }

    #[test]
    fn test_affected_objects() {
        let change = Change::CreateIndex {
            schema: None,
            table: "users".to_string(),
            index: "idx_users_email".to_string(),
            columns: vec!["email".to_string()],
            unique: true,
        };

        let objects = change.affected_objects();
        assert!(objects.iter().any(|o| o.kind == ObjectKind::Table));
        assert!(objects
            .iter()
            .any(|o| o.kind == ObjectKind::Index && o.name == "idx_users_email"));
    }

    #[test]
    fn test_checksum_component_tracks_fields() {
        let a = Change::DropColumn {
            schema: None,
            table: "users".to_string(),
            column: "a".to_string(),
        };
        let b = Change::DropColumn {
            schema: None,
            table: "users".to_string(),
            column: "b".to_string(),
        };
        assert_ne!(a.checksum_component(), b.checksum_component());
        assert_eq!(a.checksum_component(), a.clone().checksum_component());
    }
}
