//! Dialect-neutral statement model.
//!
//! A [`Statement`] describes a single database operation as pure data; it
//! carries no SQL text. Statements are constructed by a change at generation
//! time, handed to a dialect generator, and discarded.

use serde::{Deserialize, Serialize};

/// A column type, independent of any dialect's spelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// 16-bit integer.
    SmallInt,
    /// Unbounded text.
    Text,
    /// Bounded varchar.
    VarChar(u32),
    /// Boolean.
    Boolean,
    /// Timestamp without time zone.
    Timestamp,
    /// Timestamp with time zone.
    TimestampTz,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// UUID.
    Uuid,
    /// Fixed-point decimal.
    Decimal {
        /// Total digits.
        precision: u32,
        /// Digits after the point.
        scale: u32,
    },
    /// Single-precision float.
    Real,
    /// Double-precision float.
    DoublePrecision,
    /// Raw bytes.
    Binary,
    /// A type spelled verbatim in the changelog, passed through untranslated.
    Custom(String),
}

impl ColumnType {
    /// Parse a changelog type string such as `"varchar(255)"` or
    /// `"decimal(10,2)"`. Unrecognized names become [`ColumnType::Custom`].
    pub fn parse(raw: &str) -> Self {
        let lowered = raw.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "int" | "integer" => return Self::Integer,
            "bigint" => return Self::BigInt,
            "smallint" => return Self::SmallInt,
            "text" | "clob" => return Self::Text,
            "boolean" | "bool" => return Self::Boolean,
            "timestamp" | "datetime" => return Self::Timestamp,
            "timestamptz" => return Self::TimestampTz,
            "date" => return Self::Date,
            "time" => return Self::Time,
            "uuid" => return Self::Uuid,
            "real" | "float" => return Self::Real,
            "double" | "double precision" => return Self::DoublePrecision,
            "binary" | "blob" | "bytea" => return Self::Binary,
            _ => {}
        }

        if let Some(args) = parse_type_args(&lowered, "varchar") {
            if let [len] = args[..] {
                return Self::VarChar(len);
            }
        }
        if let Some(args) = parse_type_args(&lowered, "decimal")
            .or_else(|| parse_type_args(&lowered, "numeric"))
        {
            if let [precision, scale] = args[..] {
                return Self::Decimal { precision, scale };
            }
        }

        Self::Custom(raw.trim().to_string())
    }
}

/// Parse `name(a)` or `name(a,b)` into the numeric arguments.
fn parse_type_args(lowered: &str, name: &str) -> Option<Vec<u32>> {
    let rest = lowered.strip_prefix(name)?.trim();
    let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
    inner
        .split(',')
        .map(|part| part.trim().parse::<u32>().ok())
        .collect()
}

/// A column default value.
///
/// The distinction matters to generators: literals are quoted, numerics and
/// expressions are emitted verbatim, and booleans use the dialect's boolean
/// literals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefaultValue {
    /// A string literal, quoted by the generator.
    Literal(String),
    /// A numeric value, emitted verbatim.
    Numeric(String),
    /// A boolean, spelled per dialect.
    Boolean(bool),
    /// A computed expression such as `CURRENT_TIMESTAMP`, emitted verbatim.
    Expression(String),
}

/// A single column-level constraint.
///
/// Constraints are independent value objects so a column may carry any
/// subset of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnConstraint {
    /// NOT NULL.
    NotNull,
    /// Member of the primary key.
    PrimaryKey,
    /// Single-column unique.
    Unique,
    /// Auto-incrementing key.
    AutoIncrement,
    /// Single-column foreign key.
    ForeignKey(ForeignKeyRef),
}

/// Target of a column-level foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    /// Referenced table.
    pub table: String,
    /// Referenced column.
    pub column: String,
}

/// Action taken on the referencing row when the referenced row changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferentialAction {
    /// NO ACTION.
    NoAction,
    /// RESTRICT.
    Restrict,
    /// CASCADE.
    Cascade,
    /// SET NULL.
    SetNull,
    /// SET DEFAULT.
    SetDefault,
}

impl ReferentialAction {
    /// The SQL spelling, identical across supported dialects.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// One column in a create-table or add-column statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Column type.
    pub column_type: ColumnType,
    /// Default value, if any.
    pub default: Option<DefaultValue>,
    /// Constraint set.
    pub constraints: Vec<ColumnConstraint>,
}

impl ColumnDef {
    /// Create a column with no default and no constraints.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            default: None,
            constraints: Vec::new(),
        }
    }

    /// Set the default value.
    pub fn default_value(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Add a constraint.
    pub fn constraint(mut self, constraint: ColumnConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Mark NOT NULL.
    pub fn not_null(self) -> Self {
        self.constraint(ColumnConstraint::NotNull)
    }

    /// Mark as primary key.
    pub fn primary_key(self) -> Self {
        self.constraint(ColumnConstraint::PrimaryKey)
    }

    /// Mark unique.
    pub fn unique(self) -> Self {
        self.constraint(ColumnConstraint::Unique)
    }

    /// Mark auto-incrementing.
    pub fn auto_increment(self) -> Self {
        self.constraint(ColumnConstraint::AutoIncrement)
    }

    /// Whether the column is part of the primary key.
    pub fn is_primary_key(&self) -> bool {
        self.constraints.contains(&ColumnConstraint::PrimaryKey)
    }

    /// Whether the column is NOT NULL.
    pub fn is_not_null(&self) -> bool {
        self.constraints.contains(&ColumnConstraint::NotNull)
    }

    /// Whether the column is unique.
    pub fn is_unique(&self) -> bool {
        self.constraints.contains(&ColumnConstraint::Unique)
    }

    /// Whether the column auto-increments.
    pub fn is_auto_increment(&self) -> bool {
        self.constraints.contains(&ColumnConstraint::AutoIncrement)
    }

    /// The column-level foreign key, if one is declared.
    pub fn foreign_key(&self) -> Option<&ForeignKeyRef> {
        self.constraints.iter().find_map(|c| match c {
            ColumnConstraint::ForeignKey(fk) => Some(fk),
            _ => None,
        })
    }
}

/// A dialect-neutral description of one database operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// CREATE TABLE.
    CreateTable {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Table name.
        table: String,
        /// Column definitions in declaration order.
        columns: Vec<ColumnDef>,
    },
    /// DROP TABLE.
    DropTable {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Table name.
        table: String,
        /// Whether to cascade to dependent objects.
        cascade: bool,
    },
    /// Rename a table.
    RenameTable {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// ALTER TABLE ... ADD COLUMN.
    AddColumn {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Table name.
        table: String,
        /// The column to add.
        column: ColumnDef,
    },
    /// ALTER TABLE ... DROP COLUMN.
    DropColumn {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Table name.
        table: String,
        /// Column to drop.
        column: String,
    },
    /// Rename a column.
    RenameColumn {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Table name.
        table: String,
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// Add a named multi-column unique constraint.
    AddUniqueConstraint {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Table name.
        table: String,
        /// Constraint name.
        name: String,
        /// Constrained columns.
        columns: Vec<String>,
    },
    /// Drop a named unique constraint.
    DropUniqueConstraint {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Table name.
        table: String,
        /// Constraint name.
        name: String,
    },
    /// Add a named foreign key constraint.
    AddForeignKey {
        /// Optional schema qualifier of the base table.
        schema: Option<String>,
        /// Referencing table.
        table: String,
        /// Constraint name.
        name: String,
        /// Referencing columns.
        columns: Vec<String>,
        /// Referenced table.
        ref_table: String,
        /// Referenced columns.
        ref_columns: Vec<String>,
        /// ON DELETE action.
        on_delete: Option<ReferentialAction>,
        /// ON UPDATE action.
        on_update: Option<ReferentialAction>,
    },
    /// Drop a named foreign key constraint.
    DropForeignKey {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Referencing table.
        table: String,
        /// Constraint name.
        name: String,
    },
    /// CREATE [UNIQUE] INDEX.
    CreateIndex {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Indexed table.
        table: String,
        /// Index name.
        name: String,
        /// Indexed columns.
        columns: Vec<String>,
        /// Whether the index is unique.
        unique: bool,
    },
    /// DROP INDEX.
    DropIndex {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Indexed table (required by dialects that scope indexes to tables).
        table: String,
        /// Index name.
        name: String,
    },
    /// CREATE [OR REPLACE] VIEW.
    CreateView {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// View name.
        view: String,
        /// SELECT body, emitted verbatim.
        definition: String,
        /// Whether to replace an existing view.
        replace: bool,
    },
    /// DROP VIEW.
    DropView {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// View name.
        view: String,
    },
    /// CREATE SEQUENCE.
    CreateSequence {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Sequence name.
        sequence: String,
        /// START WITH, if declared.
        start: Option<i64>,
        /// INCREMENT BY, if declared.
        increment: Option<i64>,
    },
    /// ALTER SEQUENCE.
    AlterSequence {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Sequence name.
        sequence: String,
        /// New INCREMENT BY, if changed.
        increment: Option<i64>,
        /// RESTART WITH, if requested.
        restart_with: Option<i64>,
    },
    /// DROP SEQUENCE.
    DropSequence {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Sequence name.
        sequence: String,
    },
    /// Change a column's nullability.
    SetNullable {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Column type, for dialects whose ALTER requires restating it.
        column_type: Option<ColumnType>,
        /// Target nullability.
        nullable: bool,
    },
    /// Set a column default.
    SetDefaultValue {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// The new default.
        default: DefaultValue,
    },
    /// Drop a column default.
    DropDefaultValue {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// UPDATE one column for all (or filtered) rows. Used to populate a
    /// freshly added column's default into existing rows.
    Update {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Table name.
        table: String,
        /// Column being set.
        column: String,
        /// Value to set.
        value: DefaultValue,
        /// Optional WHERE clause body, emitted verbatim.
        where_clause: Option<String>,
    },
    /// Reorganize a table after structural changes, on dialects that
    /// require it before further access.
    ReorganizeTable {
        /// Optional schema qualifier.
        schema: Option<String>,
        /// Table name.
        table: String,
    },
    /// Raw SQL supplied by the changelog author, emitted verbatim.
    RawSql {
        /// The statement text.
        sql: String,
    },
}

/// Fieldless mirror of [`Statement`], used as a registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    CreateTable,
    DropTable,
    RenameTable,
    AddColumn,
    DropColumn,
    RenameColumn,
    AddUniqueConstraint,
    DropUniqueConstraint,
    AddForeignKey,
    DropForeignKey,
    CreateIndex,
    DropIndex,
    CreateView,
    DropView,
    CreateSequence,
    AlterSequence,
    DropSequence,
    SetNullable,
    SetDefaultValue,
    DropDefaultValue,
    Update,
    ReorganizeTable,
    RawSql,
}

impl StatementKind {
    /// Every statement kind, in declaration order. Used to register
    /// fallback generators.
    pub const ALL: [StatementKind; 23] = [
        StatementKind::CreateTable,
        StatementKind::DropTable,
        StatementKind::RenameTable,
        StatementKind::AddColumn,
        StatementKind::DropColumn,
        StatementKind::RenameColumn,
        StatementKind::AddUniqueConstraint,
        StatementKind::DropUniqueConstraint,
        StatementKind::AddForeignKey,
        StatementKind::DropForeignKey,
        StatementKind::CreateIndex,
        StatementKind::DropIndex,
        StatementKind::CreateView,
        StatementKind::DropView,
        StatementKind::CreateSequence,
        StatementKind::AlterSequence,
        StatementKind::DropSequence,
        StatementKind::SetNullable,
        StatementKind::SetDefaultValue,
        StatementKind::DropDefaultValue,
        StatementKind::Update,
        StatementKind::ReorganizeTable,
        StatementKind::RawSql,
    ];

    /// The change-kind style name, used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::CreateTable => "createTable",
            Self::DropTable => "dropTable",
            Self::RenameTable => "renameTable",
            Self::AddColumn => "addColumn",
            Self::DropColumn => "dropColumn",
            Self::RenameColumn => "renameColumn",
            Self::AddUniqueConstraint => "addUniqueConstraint",
            Self::DropUniqueConstraint => "dropUniqueConstraint",
            Self::AddForeignKey => "addForeignKeyConstraint",
            Self::DropForeignKey => "dropForeignKeyConstraint",
            Self::CreateIndex => "createIndex",
            Self::DropIndex => "dropIndex",
            Self::CreateView => "createView",
            Self::DropView => "dropView",
            Self::CreateSequence => "createSequence",
            Self::AlterSequence => "alterSequence",
            Self::DropSequence => "dropSequence",
            Self::SetNullable => "setNullable",
            Self::SetDefaultValue => "addDefaultValue",
            Self::DropDefaultValue => "dropDefaultValue",
            Self::Update => "update",
            Self::ReorganizeTable => "reorganizeTable",
            Self::RawSql => "sql",
        }
    }
}

impl Statement {
    /// The kind of this statement, for generator dispatch.
    pub fn kind(&self) -> StatementKind {
        match self {
            Self::CreateTable { .. } => StatementKind::CreateTable,
            Self::DropTable { .. } => StatementKind::DropTable,
            Self::RenameTable { .. } => StatementKind::RenameTable,
            Self::AddColumn { .. } => StatementKind::AddColumn,
            Self::DropColumn { .. } => StatementKind::DropColumn,
            Self::RenameColumn { .. } => StatementKind::RenameColumn,
            Self::AddUniqueConstraint { .. } => StatementKind::AddUniqueConstraint,
            Self::DropUniqueConstraint { .. } => StatementKind::DropUniqueConstraint,
            Self::AddForeignKey { .. } => StatementKind::AddForeignKey,
            Self::DropForeignKey { .. } => StatementKind::DropForeignKey,
            Self::CreateIndex { .. } => StatementKind::CreateIndex,
            Self::DropIndex { .. } => StatementKind::DropIndex,
            Self::CreateView { .. } => StatementKind::CreateView,
            Self::DropView { .. } => StatementKind::DropView,
            Self::CreateSequence { .. } => StatementKind::CreateSequence,
            Self::AlterSequence { .. } => StatementKind::AlterSequence,
            Self::DropSequence { .. } => StatementKind::DropSequence,
            Self::SetNullable { .. } => StatementKind::SetNullable,
            Self::SetDefaultValue { .. } => StatementKind::SetDefaultValue,
            Self::DropDefaultValue { .. } => StatementKind::DropDefaultValue,
            Self::Update { .. } => StatementKind::Update,
            Self::ReorganizeTable { .. } => StatementKind::ReorganizeTable,
            Self::RawSql { .. } => StatementKind::RawSql,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_type_parse() {
        assert_eq!(ColumnType::parse("int"), ColumnType::Integer);
        assert_eq!(ColumnType::parse("INTEGER"), ColumnType::Integer);
        assert_eq!(ColumnType::parse("varchar(255)"), ColumnType::VarChar(255));
        assert_eq!(
            ColumnType::parse("decimal(10, 2)"),
            ColumnType::Decimal {
                precision: 10,
                scale: 2
            }
        );
        assert_eq!(
            ColumnType::parse("tsvector"),
            ColumnType::Custom("tsvector".to_string())
        );
    }

    #[test]
    fn test_column_builder() {
        let col = ColumnDef::new("id", ColumnType::BigInt)
            .primary_key()
            .auto_increment();

        assert!(col.is_primary_key());
        assert!(col.is_auto_increment());
        assert!(!col.is_not_null());
        assert!(col.foreign_key().is_none());
    }

    #[test]
    fn test_column_foreign_key() {
        let col = ColumnDef::new("org_id", ColumnType::Integer)
            .not_null()
            .constraint(ColumnConstraint::ForeignKey(ForeignKeyRef {
                table: "orgs".to_string(),
                column: "id".to_string(),
            }));

        assert_eq!(col.foreign_key().unwrap().table, "orgs");
        assert!(col.is_not_null());
    }

    #[test]
    fn test_statement_kind() {
        let stmt = Statement::DropTable {
            schema: None,
            table: "users".to_string(),
            cascade: false,
        };
        assert_eq!(stmt.kind(), StatementKind::DropTable);

        let stmt = Statement::RawSql {
            sql: "SELECT 1".to_string(),
        };
        assert_eq!(stmt.kind(), StatementKind::RawSql);
    }
}
