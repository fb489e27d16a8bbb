//! Changelogs: the ordered collection of change sets, loaded from TOML.
//!
//! A changelog file declares `[[changeset]]` entries and may compose other
//! changelogs with `[[include]]`. Included files expand, in declaration
//! order, ahead of the including file's own change sets, giving one
//! deterministic global order. A `[properties]` table provides `${key}`
//! substitution; the outermost definition of a property wins.
//!
//! ```toml
//! [properties]
//! app_schema = "app"
//!
//! [[include]]
//! file = "users.toml"
//!
//! [[changeset]]
//! id = "2"
//! author = "alice"
//! context = "prod"
//!
//! [[changeset.changes]]
//! kind = "addColumn"
//! table = "users"
//!
//! [[changeset.changes.columns]]
//! name = "active"
//! type = "boolean"
//! default_value_boolean = true
//! ```

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::change::Change;
use crate::changeset::ChangeSet;
use crate::database::Database;
use crate::error::{MigrateResult, MigrationError, ValidationErrors, ValidationIssue};
use crate::filter::FilterExpression;
use crate::generator::GeneratorRegistry;
use crate::precondition::Precondition;
use crate::statement::{
    ColumnConstraint, ColumnDef, ColumnType, DefaultValue, ForeignKeyRef, ReferentialAction,
};

/// An ordered collection of change sets: what should be applied, in what
/// order.
#[derive(Debug, Clone)]
pub struct ChangeLog {
    /// Logical path of the root changelog file.
    pub logical_path: String,
    /// Change sets in application order, includes expanded.
    pub change_sets: Vec<ChangeSet>,
    /// Effective properties after include resolution.
    pub properties: IndexMap<String, String>,
}

impl ChangeLog {
    /// An empty changelog, for programmatic construction.
    pub fn new(logical_path: impl Into<String>) -> Self {
        Self {
            logical_path: logical_path.into(),
            change_sets: Vec::new(),
            properties: IndexMap::new(),
        }
    }

    /// Append a change set.
    pub fn push(&mut self, change_set: ChangeSet) {
        self.change_sets.push(change_set);
    }

    /// Load a changelog file, expanding includes relative to it.
    pub async fn load(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let path = path.as_ref();
        let logical = path.to_string_lossy().into_owned();

        let mut properties = IndexMap::new();
        let mut visited = HashSet::new();
        let change_sets = load_file(
            path.to_path_buf(),
            logical.clone(),
            &mut properties,
            &mut visited,
        )
        .await?;

        Ok(Self {
            logical_path: logical,
            change_sets,
            properties,
        })
    }

    /// Find a change set by id and author.
    pub fn find(&self, id: &str, author: &str) -> Option<&ChangeSet> {
        self.change_sets
            .iter()
            .find(|cs| cs.identity.id == id && cs.identity.author == author)
    }

    /// Validate the whole changelog against a target database: duplicate
    /// identities plus every change set's own validation, collected into
    /// one batch.
    pub fn validate(&self, database: &Database, registry: &GeneratorRegistry) -> ValidationErrors {
        let mut errors = ValidationErrors::new();

        let mut seen = HashSet::new();
        for change_set in &self.change_sets {
            if !seen.insert(change_set.identity.clone()) {
                errors.push(ValidationIssue {
                    change_set: Some(change_set.identity.clone()),
                    message: "duplicate change set identity".to_string(),
                });
            }

            // A set filtered out for this database never generates SQL for
            // it, so dialect validation does not apply.
            if !database.kind().matches_dbms(&change_set.dbms) {
                continue;
            }

            for issue in change_set.validate(database, registry) {
                errors.push_for(change_set.identity.clone(), issue);
            }
        }

        errors
    }
}

/// Replace `${key}` placeholders. Unknown keys are left untouched so the
/// parser reports them in context.
fn substitute(content: &str, properties: &IndexMap<String, String>) -> String {
    let mut result = content.to_string();
    for (key, value) in properties {
        result = result.replace(&format!("${{{key}}}"), value);
    }
    result
}

fn load_file<'a>(
    path: PathBuf,
    logical: String,
    properties: &'a mut IndexMap<String, String>,
    visited: &'a mut HashSet<PathBuf>,
) -> Pin<Box<dyn Future<Output = MigrateResult<Vec<ChangeSet>>> + Send + 'a>> {
    Box::pin(async move {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
        if !visited.insert(canonical) {
            return Err(MigrationError::parse(
                logical,
                "include cycle detected",
            ));
        }

        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            MigrationError::parse(logical.clone(), format!("cannot read file: {e}"))
        })?;

        // Properties must be known before substitution, so pull them out of
        // a value-level parse first. The outermost definition wins.
        let value: toml::Value = toml::from_str(&content)
            .map_err(|e| MigrationError::parse(logical.clone(), e.to_string()))?;
        if let Some(table) = value.get("properties").and_then(toml::Value::as_table) {
            for (key, val) in table {
                if let Some(text) = val.as_str() {
                    properties
                        .entry(key.clone())
                        .or_insert_with(|| text.to_string());
                }
            }
        }

        let substituted = substitute(&content, properties);
        let parsed: ChangelogFile = toml::from_str(&substituted)
            .map_err(|e| MigrationError::parse(logical.clone(), e.to_string()))?;

        let mut change_sets = Vec::new();

        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        for include in &parsed.include {
            let child_path = base.join(&include.file);
            change_sets.extend(
                load_file(child_path, include.file.clone(), properties, visited).await?,
            );
        }

        for decl in parsed.changeset {
            change_sets.push(decl.into_change_set(&logical)?);
        }

        Ok(change_sets)
    })
}

#[derive(Debug, Default, Deserialize)]
struct ChangelogFile {
    #[serde(default)]
    #[allow(dead_code)] // consumed by the pre-parse pass
    properties: IndexMap<String, String>,
    #[serde(default)]
    include: Vec<IncludeDecl>,
    #[serde(default)]
    changeset: Vec<ChangeSetDecl>,
}

#[derive(Debug, Deserialize)]
struct IncludeDecl {
    file: String,
}

#[derive(Debug, Deserialize)]
struct ChangeSetDecl {
    id: String,
    author: String,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    labels: Option<String>,
    #[serde(default)]
    dbms: Option<String>,
    #[serde(default)]
    run_always: bool,
    #[serde(default)]
    run_on_change: bool,
    #[serde(default)]
    fail_on_error: Option<bool>,
    #[serde(default)]
    object_quoting: Option<String>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    preconditions: Vec<Precondition>,
    #[serde(default)]
    changes: Vec<ChangeDecl>,
    #[serde(default)]
    rollback: Option<Vec<ChangeDecl>>,
}

impl ChangeSetDecl {
    fn into_change_set(self, file: &str) -> MigrateResult<ChangeSet> {
        let parse_expr = |raw: &Option<String>| -> MigrateResult<FilterExpression> {
            match raw {
                Some(raw) => FilterExpression::parse(raw).map_err(|e| {
                    MigrationError::parse(file.to_string(), e.to_string())
                }),
                None => Ok(FilterExpression::always()),
            }
        };

        let mut change_set = ChangeSet::new(self.id, self.author, file);
        change_set.context = parse_expr(&self.context)?;
        change_set.labels = parse_expr(&self.labels)?;
        change_set.dbms = self.dbms.unwrap_or_default();
        change_set.run_always = self.run_always;
        change_set.run_on_change = self.run_on_change;
        change_set.fail_on_error = self.fail_on_error.unwrap_or(true);
        change_set.quoting = match self.object_quoting.as_deref() {
            None => None,
            Some("legacy") => Some(crate::database::QuotingStrategy::Legacy),
            Some("quote_all") => Some(crate::database::QuotingStrategy::QuoteAll),
            Some(other) => {
                return Err(MigrationError::parse(
                    file.to_string(),
                    format!("unknown object_quoting '{other}'"),
                ));
            }
        };
        change_set.comment = self.comment;
        change_set.preconditions = self.preconditions;
        change_set.changes = self
            .changes
            .into_iter()
            .map(ChangeDecl::into_change)
            .collect();
        change_set.rollback = self
            .rollback
            .map(|specs| specs.into_iter().map(ChangeDecl::into_change).collect());

        Ok(change_set)
    }
}

/// A column as written in a changelog.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ColumnDecl {
    name: String,
    #[serde(rename = "type")]
    column_type: String,
    #[serde(default)]
    nullable: Option<bool>,
    #[serde(default)]
    primary_key: bool,
    #[serde(default)]
    unique: bool,
    #[serde(default)]
    auto_increment: bool,
    #[serde(default)]
    default_value: Option<String>,
    #[serde(default)]
    default_value_numeric: Option<String>,
    #[serde(default)]
    default_value_boolean: Option<bool>,
    #[serde(default)]
    default_value_computed: Option<String>,
    #[serde(default)]
    references: Option<ForeignKeyDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ForeignKeyDecl {
    table: String,
    column: String,
}

impl ColumnDecl {
    fn into_column(self) -> ColumnDef {
        let mut column = ColumnDef::new(self.name, ColumnType::parse(&self.column_type));

        if let Some(default) = pick_default(
            self.default_value,
            self.default_value_numeric,
            self.default_value_boolean,
            self.default_value_computed,
        ) {
            column = column.default_value(default);
        }

        if self.primary_key {
            column = column.primary_key();
        }
        if self.nullable == Some(false) {
            column = column.not_null();
        }
        if self.unique {
            column = column.unique();
        }
        if self.auto_increment {
            column = column.auto_increment();
        }
        if let Some(fk) = self.references {
            column = column.constraint(ColumnConstraint::ForeignKey(ForeignKeyRef {
                table: fk.table,
                column: fk.column,
            }));
        }

        column
    }
}

fn pick_default(
    literal: Option<String>,
    numeric: Option<String>,
    boolean: Option<bool>,
    computed: Option<String>,
) -> Option<DefaultValue> {
    if let Some(expr) = computed {
        Some(DefaultValue::Expression(expr))
    } else if let Some(flag) = boolean {
        Some(DefaultValue::Boolean(flag))
    } else if let Some(number) = numeric {
        Some(DefaultValue::Numeric(number))
    } else {
        literal.map(DefaultValue::Literal)
    }
}

/// A change as written in a changelog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum ChangeDecl {
    CreateTable {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        columns: Vec<ColumnDecl>,
    },
    DropTable {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        #[serde(default)]
        cascade: bool,
    },
    RenameTable {
        #[serde(default)]
        schema: Option<String>,
        from: String,
        to: String,
    },
    AddColumn {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        columns: Vec<ColumnDecl>,
    },
    DropColumn {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        column: String,
    },
    RenameColumn {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        from: String,
        to: String,
    },
    CreateIndex {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        index: String,
        columns: Vec<String>,
        #[serde(default)]
        unique: bool,
    },
    DropIndex {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        index: String,
    },
    AddUniqueConstraint {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        name: String,
        columns: Vec<String>,
    },
    DropUniqueConstraint {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        name: String,
    },
    AddForeignKeyConstraint {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        name: String,
        columns: Vec<String>,
        ref_table: String,
        ref_columns: Vec<String>,
        #[serde(default)]
        on_delete: Option<ReferentialAction>,
        #[serde(default)]
        on_update: Option<ReferentialAction>,
    },
    DropForeignKeyConstraint {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        name: String,
    },
    CreateView {
        #[serde(default)]
        schema: Option<String>,
        view: String,
        definition: String,
        #[serde(default)]
        replace: bool,
    },
    DropView {
        #[serde(default)]
        schema: Option<String>,
        view: String,
    },
    CreateSequence {
        #[serde(default)]
        schema: Option<String>,
        sequence: String,
        #[serde(default)]
        start: Option<i64>,
        #[serde(default)]
        increment: Option<i64>,
    },
    AlterSequence {
        #[serde(default)]
        schema: Option<String>,
        sequence: String,
        #[serde(default)]
        increment: Option<i64>,
        #[serde(default)]
        restart_with: Option<i64>,
    },
    DropSequence {
        #[serde(default)]
        schema: Option<String>,
        sequence: String,
    },
    AddNotNullConstraint {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        column: String,
        #[serde(default)]
        column_type: Option<String>,
        #[serde(default)]
        default_null_value: Option<String>,
    },
    DropNotNullConstraint {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        column: String,
        #[serde(default)]
        column_type: Option<String>,
    },
    AddDefaultValue {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        column: String,
        #[serde(default)]
        default_value: Option<String>,
        #[serde(default)]
        default_value_numeric: Option<String>,
        #[serde(default)]
        default_value_boolean: Option<bool>,
        #[serde(default)]
        default_value_computed: Option<String>,
    },
    DropDefaultValue {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        column: String,
    },
    Sql {
        sql: String,
        #[serde(default)]
        rollback: Option<String>,
    },
    Update {
        #[serde(default)]
        schema: Option<String>,
        table: String,
        column: String,
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        value_numeric: Option<String>,
        #[serde(default)]
        value_boolean: Option<bool>,
        #[serde(default)]
        value_computed: Option<String>,
        #[serde(default)]
        r#where: Option<String>,
    },
}

impl ChangeDecl {
    fn into_change(self) -> Change {
        match self {
            Self::CreateTable {
                schema,
                table,
                columns,
            } => Change::CreateTable {
                schema,
                table,
                columns: columns.into_iter().map(ColumnDecl::into_column).collect(),
            },
            Self::DropTable {
                schema,
                table,
                cascade,
            } => Change::DropTable {
                schema,
                table,
                cascade,
            },
            Self::RenameTable { schema, from, to } => Change::RenameTable { schema, from, to },
            Self::AddColumn {
                schema,
                table,
                columns,
            } => Change::AddColumn {
                schema,
                table,
                columns: columns.into_iter().map(ColumnDecl::into_column).collect(),
            },
            Self::DropColumn {
                schema,
                table,
                column,
            } => Change::DropColumn {
                schema,
                table,
                column,
            },
            Self::RenameColumn {
                schema,
                table,
                from,
                to,
            } => Change::RenameColumn {
                schema,
                table,
                from,
                to,
            },
            Self::CreateIndex {
                schema,
                table,
                index,
                columns,
                unique,
            } => Change::CreateIndex {
                schema,
                table,
                index,
                columns,
                unique,
            },
            Self::DropIndex {
                schema,
                table,
                index,
            } => Change::DropIndex {
                schema,
                table,
                index,
            },
            Self::AddUniqueConstraint {
                schema,
                table,
                name,
                columns,
            } => Change::AddUniqueConstraint {
                schema,
                table,
                name,
                columns,
            },
            Self::DropUniqueConstraint {
                schema,
                table,
                name,
            } => Change::DropUniqueConstraint {
                schema,
                table,
                name,
            },
            Self::AddForeignKeyConstraint {
                schema,
                table,
                name,
                columns,
                ref_table,
                ref_columns,
                on_delete,
                on_update,
            } => Change::AddForeignKey {
                schema,
                table,
                name,
                columns,
                ref_table,
                ref_columns,
                on_delete,
                on_update,
            },
            Self::DropForeignKeyConstraint {
                schema,
                table,
                name,
            } => Change::DropForeignKey {
                schema,
                table,
                name,
            },
            Self::CreateView {
                schema,
                view,
                definition,
                replace,
            } => Change::CreateView {
                schema,
                view,
                definition,
                replace,
            },
            Self::DropView { schema, view } => Change::DropView { schema, view },
            Self::CreateSequence {
                schema,
                sequence,
                start,
                increment,
            } => Change::CreateSequence {
                schema,
                sequence,
                start,
                increment,
            },
            Self::AlterSequence {
                schema,
                sequence,
                increment,
                restart_with,
            } => Change::AlterSequence {
                schema,
                sequence,
                increment,
                restart_with,
            },
            Self::DropSequence { schema, sequence } => Change::DropSequence { schema, sequence },
            Self::AddNotNullConstraint {
                schema,
                table,
                column,
                column_type,
                default_null_value,
            } => Change::AddNotNull {
                schema,
                table,
                column,
                column_type: column_type.as_deref().map(ColumnType::parse),
                default_for_existing: default_null_value.map(DefaultValue::Literal),
            },
            Self::DropNotNullConstraint {
                schema,
                table,
                column,
                column_type,
            } => Change::DropNotNull {
                schema,
                table,
                column,
                column_type: column_type.as_deref().map(ColumnType::parse),
            },
            Self::AddDefaultValue {
                schema,
                table,
                column,
                default_value,
                default_value_numeric,
                default_value_boolean,
                default_value_computed,
            } => Change::AddDefaultValue {
                schema,
                table,
                column,
                default: pick_default(
                    default_value,
                    default_value_numeric,
                    default_value_boolean,
                    default_value_computed,
                )
                .unwrap_or(DefaultValue::Expression("NULL".to_string())),
            },
            Self::DropDefaultValue {
                schema,
                table,
                column,
            } => Change::DropDefaultValue {
                schema,
                table,
                column,
            },
            Self::Sql { sql, rollback } => Change::Sql { sql, rollback },
            Self::Update {
                schema,
                table,
                column,
                value,
                value_numeric,
                value_boolean,
                value_computed,
                r#where,
            } => Change::Update {
                schema,
                table,
                column,
                value: pick_default(value, value_numeric, value_boolean, value_computed)
                    .unwrap_or(DefaultValue::Expression("NULL".to_string())),
                where_clause: r#where,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DatabaseKind, MemoryConnection};
    use crate::precondition::FailAction;

    fn db(kind: DatabaseKind) -> Database {
        Database::new(kind, Box::new(MemoryConnection::new()))
    }

    async fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        tokio::fs::write(&path, content).await.unwrap();
        path
    }

    const USERS_CHANGELOG: &str = r#"
[[changeset]]
id = "1"
author = "alice"
comment = "create the users table"

[[changeset.changes]]
kind = "createTable"
table = "users"

[[changeset.changes.columns]]
name = "id"
type = "bigint"
primary_key = true
auto_increment = true

[[changeset.changes.columns]]
name = "email"
type = "varchar(255)"
nullable = false
unique = true
"#;

    #[tokio::test]
    async fn test_load_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "changelog.toml", USERS_CHANGELOG).await;

        let changelog = ChangeLog::load(&path).await.unwrap();
        assert_eq!(changelog.change_sets.len(), 1);

        let change_set = &changelog.change_sets[0];
        assert_eq!(change_set.identity.id, "1");
        assert_eq!(change_set.identity.author, "alice");
        assert!(change_set.fail_on_error);

        match &change_set.changes[0] {
            Change::CreateTable { table, columns, .. } => {
                assert_eq!(table, "users");
                assert_eq!(columns.len(), 2);
                assert!(columns[0].is_auto_increment());
                assert_eq!(columns[1].column_type, ColumnType::VarChar(255));
            }
            other => panic!("unexpected change: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_include_expands_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "users.toml", USERS_CHANGELOG).await;

        let root = write(
            dir.path(),
            "changelog.toml",
            r#"
[[include]]
file = "users.toml"

[[changeset]]
id = "2"
author = "bob"

[[changeset.changes]]
kind = "addColumn"
table = "users"

[[changeset.changes.columns]]
name = "active"
type = "boolean"
default_value_boolean = true
"#,
        )
        .await;

        let changelog = ChangeLog::load(&root).await.unwrap();
        assert_eq!(changelog.change_sets.len(), 2);
        // Included sets come first, and keep their own logical file path.
        assert_eq!(changelog.change_sets[0].identity.id, "1");
        assert_eq!(changelog.change_sets[0].identity.file, "users.toml");
        assert_eq!(changelog.change_sets[1].identity.id, "2");
    }

    #[tokio::test]
    async fn test_include_cycle_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "a.toml",
            "[[include]]\nfile = \"b.toml\"\n",
        )
        .await;
        write(
            dir.path(),
            "b.toml",
            "[[include]]\nfile = \"a.toml\"\n",
        )
        .await;

        let err = ChangeLog::load(dir.path().join("a.toml")).await.unwrap_err();
        assert!(err.to_string().contains("include cycle"));
    }

    #[tokio::test]
    async fn test_property_substitution_outermost_wins() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "child.toml",
            r#"
[properties]
table_name = "ignored"

[[changeset]]
id = "1"
author = "alice"

[[changeset.changes]]
kind = "dropTable"
table = "${table_name}"
"#,
        )
        .await;

        let root = write(
            dir.path(),
            "root.toml",
            r#"
[properties]
table_name = "legacy_users"

[[include]]
file = "child.toml"
"#,
        )
        .await;

        let changelog = ChangeLog::load(&root).await.unwrap();
        match &changelog.change_sets[0].changes[0] {
            Change::DropTable { table, .. } => assert_eq!(table, "legacy_users"),
            other => panic!("unexpected change: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reload_preserves_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "changelog.toml", USERS_CHANGELOG).await;

        let first = ChangeLog::load(&path).await.unwrap().change_sets[0].checksum();
        let second = ChangeLog::load(&path).await.unwrap().change_sets[0].checksum();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_comment_change_keeps_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "changelog.toml", USERS_CHANGELOG).await;
        let original = ChangeLog::load(&path).await.unwrap().change_sets[0].checksum();

        let edited = USERS_CHANGELOG.replace("create the users table", "different comment");
        let path = write(dir.path(), "edited.toml", &edited).await;
        let reloaded = ChangeLog::load(&path).await.unwrap().change_sets[0].checksum();

        assert_eq!(original, reloaded);
    }

    #[tokio::test]
    async fn test_executable_change_changes_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "changelog.toml", USERS_CHANGELOG).await;
        let original = ChangeLog::load(&path).await.unwrap().change_sets[0].checksum();

        let edited = USERS_CHANGELOG.replace("varchar(255)", "varchar(512)");
        let path = write(dir.path(), "edited.toml", &edited).await;
        let reloaded = ChangeLog::load(&path).await.unwrap().change_sets[0].checksum();

        assert_ne!(original, reloaded);
    }

    #[tokio::test]
    async fn test_preconditions_and_flags_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "changelog.toml",
            r#"
[[changeset]]
id = "1"
author = "alice"
context = "prod"
labels = "billing or core"
dbms = "postgresql"
run_always = true
fail_on_error = false

[[changeset.preconditions]]
check = "columnExists"
table = "users"
column = "bar"
negate = true
on_fail = "SKIP"

[[changeset.changes]]
kind = "sql"
sql = "SELECT 1"
"#,
        )
        .await;

        let changelog = ChangeLog::load(&path).await.unwrap();
        let change_set = &changelog.change_sets[0];
        assert!(change_set.run_always);
        assert!(!change_set.fail_on_error);
        assert_eq!(change_set.dbms, "postgresql");
        assert_eq!(change_set.preconditions.len(), 1);
        assert!(change_set.preconditions[0].negate);
        assert_eq!(change_set.preconditions[0].on_fail, FailAction::Skip);
    }

    #[tokio::test]
    async fn test_explicit_empty_rollback_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "changelog.toml",
            r#"
[[changeset]]
id = "1"
author = "alice"
rollback = []

[[changeset.changes]]
kind = "dropTable"
table = "legacy"
"#,
        )
        .await;

        let changelog = ChangeLog::load(&path).await.unwrap();
        assert_eq!(changelog.change_sets[0].rollback, Some(vec![]));
        assert!(changelog.change_sets[0].rollback_changes().is_supported());
    }

    #[tokio::test]
    async fn test_duplicate_identity_collected_by_validate() {
        let dir = tempfile::tempdir().unwrap();
        let duplicated = format!("{USERS_CHANGELOG}\n{}", USERS_CHANGELOG.trim_start());
        let path = write(dir.path(), "changelog.toml", &duplicated).await;

        let changelog = ChangeLog::load(&path).await.unwrap();
        let errors = changelog.validate(&db(DatabaseKind::Postgres), &GeneratorRegistry::standard());
        assert_eq!(errors.len(), 1);
        assert!(errors.issues()[0].message.contains("duplicate"));
    }

    #[tokio::test]
    async fn test_dbms_filtered_sets_skip_dialect_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "changelog.toml",
            r#"
[[changeset]]
id = "1"
author = "alice"
dbms = "postgresql"

[[changeset.changes]]
kind = "createSequence"
sequence = "user_seq"
"#,
        )
        .await;

        let changelog = ChangeLog::load(&path).await.unwrap();
        let registry = GeneratorRegistry::standard();

        // Sequences are unsupported on SQLite, but the set is filtered out
        // there, so validation stays clean.
        assert!(changelog
            .validate(&db(DatabaseKind::Sqlite), &registry)
            .is_empty());
        assert!(changelog
            .validate(&db(DatabaseKind::Postgres), &registry)
            .is_empty());
    }

    #[tokio::test]
    async fn test_malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "broken.toml", "[[changeset]]\nid = ").await;

        let err = ChangeLog::load(&path).await.unwrap_err();
        assert!(matches!(err, MigrationError::Parse { .. }));
    }
}
