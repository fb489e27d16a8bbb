//! End-to-end engine behavior over in-memory services.

use strata_core::{
    Change, ChangeLog, ChangeSet, ChangeSetOutcome, ColumnDef, ColumnType, Database, DatabaseKind,
    Executor, FailAction, MemoryConnection, MemoryHistoryService, MemoryLockService,
    MigrationError, Precondition, RanChangeSet, RollbackTarget, StatementLog,
};

fn add_bar_column() -> Change {
    Change::AddColumn {
        schema: None,
        table: "foo".to_string(),
        columns: vec![ColumnDef::new("bar", ColumnType::Integer)],
    }
}

fn engine(
    connection: MemoryConnection,
) -> (
    Executor<MemoryHistoryService, MemoryLockService>,
    StatementLog,
) {
    let log = connection.log_handle();
    let database = Database::new(DatabaseKind::Postgres, Box::new(connection));
    (
        Executor::new(database, MemoryHistoryService::new(), MemoryLockService::new()),
        log,
    )
}

/// The specification's core scenario: add a column, re-run, roll back.
#[tokio::test]
async fn add_column_update_twice_then_rollback() {
    let (mut executor, log) = engine(MemoryConnection::new());

    let mut changelog = ChangeLog::new("changelog.toml");
    changelog.push(ChangeSet::new("1", "a", "changelog.toml").change(add_bar_column()));

    // First run: one ledger row, one ALTER statement.
    let report = executor.update(&changelog).await.unwrap();
    assert_eq!(report.executed_count(), 1);
    assert_eq!(
        report.statements,
        vec!["ALTER TABLE foo ADD COLUMN bar INTEGER"]
    );
    let status = executor.status(&changelog).await.unwrap();
    assert_eq!(status.ran.len(), 1);

    // Second run: zero statements, ledger unchanged.
    let statements_before = log.len();
    let report = executor.update(&changelog).await.unwrap();
    assert_eq!(report.executed_count(), 0);
    assert_eq!(report.count(ChangeSetOutcome::Skipped), 1);
    assert!(report.statements.is_empty());
    assert!(log
        .statements()
        .iter()
        .skip(statements_before)
        .all(|sql| !sql.starts_with("ALTER")));
    assert_eq!(executor.status(&changelog).await.unwrap().ran.len(), 1);

    // Rollback: the column goes, and so does the ledger row.
    let report = executor
        .rollback(&changelog, RollbackTarget::Count(1))
        .await
        .unwrap();
    assert_eq!(report.count(ChangeSetOutcome::RolledBack), 1);
    assert_eq!(report.statements, vec!["ALTER TABLE foo DROP COLUMN bar"]);
    assert!(executor.status(&changelog).await.unwrap().ran.is_empty());
}

/// The specification's precondition scenario: "column bar does not exist"
/// with on-fail SKIP against a database where it does exist.
#[tokio::test]
async fn skip_precondition_leaves_no_trace_and_run_continues() {
    let mut connection = MemoryConnection::new();
    connection.add_table("foo", &["id", "bar"]);
    let (mut executor, _log) = engine(connection);

    let mut changelog = ChangeLog::new("changelog.toml");
    changelog.push(
        ChangeSet::new("1", "a", "changelog.toml")
            .precondition(
                Precondition::column_exists("foo", "bar")
                    .negated()
                    .on_fail(FailAction::Skip),
            )
            .change(add_bar_column()),
    );
    changelog.push(ChangeSet::new("2", "a", "changelog.toml").change(Change::Sql {
        sql: "SELECT 1".to_string(),
        rollback: None,
    }));

    let report = executor.update(&changelog).await.unwrap();

    // Skipped without a ledger row, and the run reached the next set.
    assert_eq!(report.count(ChangeSetOutcome::Skipped), 1);
    assert_eq!(report.count(ChangeSetOutcome::Executed), 1);
    assert_eq!(report.statements, vec!["SELECT 1"]);

    let status = executor.status(&changelog).await.unwrap();
    assert_eq!(status.ran.len(), 1);
    assert_eq!(status.ran[0].id, "2");
}

#[tokio::test]
async fn halt_precondition_aborts_run() {
    let (mut executor, _log) = engine(MemoryConnection::new());

    let mut changelog = ChangeLog::new("changelog.toml");
    changelog.push(
        ChangeSet::new("1", "a", "changelog.toml")
            .precondition(Precondition::table_exists("foo"))
            .change(add_bar_column()),
    );
    changelog.push(ChangeSet::new("2", "a", "changelog.toml").change(Change::Sql {
        sql: "SELECT 1".to_string(),
        rollback: None,
    }));

    let err = executor.update(&changelog).await.unwrap_err();
    assert!(matches!(err, MigrationError::PreconditionHalt { .. }));

    // Nothing ran, including the set after the halting one.
    assert!(executor.status(&changelog).await.unwrap().ran.is_empty());
}

#[tokio::test]
async fn mark_ran_precondition_writes_ledger_without_executing() {
    let mut connection = MemoryConnection::new();
    connection.add_table("foo", &["id", "bar"]);
    let (mut executor, _log) = engine(connection);

    let mut changelog = ChangeLog::new("changelog.toml");
    changelog.push(
        ChangeSet::new("1", "a", "changelog.toml")
            .precondition(
                Precondition::column_exists("foo", "bar")
                    .negated()
                    .on_fail(FailAction::MarkRan),
            )
            .change(add_bar_column()),
    );

    let report = executor.update(&changelog).await.unwrap();
    assert_eq!(report.count(ChangeSetOutcome::MarkRan), 1);
    assert!(report.statements.is_empty());

    // Recorded as ran: the next run skips it.
    let report = executor.update(&changelog).await.unwrap();
    assert_eq!(report.count(ChangeSetOutcome::Skipped), 1);
}

/// Ledger order values strictly increase and rollback walks them in exact
/// reverse order.
#[tokio::test]
async fn ordering_and_reverse_rollback() {
    let (mut executor, _log) = engine(MemoryConnection::new());

    let mut changelog = ChangeLog::new("changelog.toml");
    for (id, table) in [("1", "alpha"), ("2", "beta"), ("3", "gamma")] {
        changelog.push(
            ChangeSet::new(id, "a", "changelog.toml").change(Change::CreateTable {
                schema: None,
                table: table.to_string(),
                columns: vec![ColumnDef::new("id", ColumnType::BigInt)],
            }),
        );
    }

    executor.update(&changelog).await.unwrap();

    let status = executor.status(&changelog).await.unwrap();
    let orders: Vec<i64> = status.ran.iter().map(|r| r.order_executed).collect();
    assert!(orders.windows(2).all(|pair| pair[0] < pair[1]));

    let report = executor
        .rollback(&changelog, RollbackTarget::Count(3))
        .await
        .unwrap();
    let rolled: Vec<&str> = report
        .change_sets
        .iter()
        .map(|r| r.identity.id.as_str())
        .collect();
    assert_eq!(rolled, vec!["3", "2", "1"]);
    assert_eq!(
        report.statements,
        vec!["DROP TABLE gamma", "DROP TABLE beta", "DROP TABLE alpha"]
    );
}

#[tokio::test]
async fn rollback_to_tag_stops_at_the_tagged_row() {
    let (mut executor, _log) = engine(MemoryConnection::new());

    let mut changelog = ChangeLog::new("changelog.toml");
    changelog.push(
        ChangeSet::new("1", "a", "changelog.toml").change(Change::CreateTable {
            schema: None,
            table: "alpha".to_string(),
            columns: vec![ColumnDef::new("id", ColumnType::BigInt)],
        }),
    );
    executor.update(&changelog).await.unwrap();
    executor.tag("v1.0").await.unwrap();
    assert!(executor.tag_exists("v1.0").await.unwrap());

    changelog.push(
        ChangeSet::new("2", "a", "changelog.toml").change(Change::CreateTable {
            schema: None,
            table: "beta".to_string(),
            columns: vec![ColumnDef::new("id", ColumnType::BigInt)],
        }),
    );
    executor.update(&changelog).await.unwrap();

    let report = executor
        .rollback(&changelog, RollbackTarget::Tag("v1.0".to_string()))
        .await
        .unwrap();

    // Only the set applied after the tag is reversed.
    assert_eq!(report.count(ChangeSetOutcome::RolledBack), 1);
    assert_eq!(report.statements, vec!["DROP TABLE beta"]);
    let status = executor.status(&changelog).await.unwrap();
    assert_eq!(status.ran.len(), 1);
    assert_eq!(status.ran[0].id, "1");
}

/// Rollback inverse correctness at the SQL level: apply-then-rollback emits
/// the structural inverse of every statement.
#[tokio::test]
async fn rollback_inverses_mirror_forward_changes() {
    let (mut executor, _log) = engine(MemoryConnection::new());

    let mut changelog = ChangeLog::new("changelog.toml");
    changelog.push(
        ChangeSet::new("1", "a", "changelog.toml")
            .change(Change::CreateTable {
                schema: None,
                table: "users".to_string(),
                columns: vec![ColumnDef::new("id", ColumnType::BigInt).primary_key()],
            })
            .change(Change::CreateIndex {
                schema: None,
                table: "users".to_string(),
                index: "idx_users_id".to_string(),
                columns: vec!["id".to_string()],
                unique: false,
            }),
    );

    executor.update(&changelog).await.unwrap();
    let report = executor
        .rollback(&changelog, RollbackTarget::Count(1))
        .await
        .unwrap();

    // Inverses run in reverse declaration order: index first, then table.
    assert_eq!(
        report.statements,
        vec!["DROP INDEX idx_users_id", "DROP TABLE users"]
    );
}

#[tokio::test]
async fn run_on_change_reruns_only_when_content_changes() {
    let (mut executor, _log) = engine(MemoryConnection::new());

    let make_changelog = |sql: &str| {
        let mut changelog = ChangeLog::new("changelog.toml");
        changelog.push(
            ChangeSet::new("1", "a", "changelog.toml")
                .run_on_change(true)
                .change(Change::Sql {
                    sql: sql.to_string(),
                    rollback: None,
                }),
        );
        changelog
    };

    let original = make_changelog("CREATE VIEW v AS SELECT 1");
    executor.update(&original).await.unwrap();

    // Unchanged content: skipped.
    let report = executor.update(&original).await.unwrap();
    assert_eq!(report.count(ChangeSetOutcome::Skipped), 1);

    // Changed content: reran, not a validation error.
    let modified = make_changelog("CREATE VIEW v AS SELECT 2");
    let report = executor.update(&modified).await.unwrap();
    assert_eq!(report.count(ChangeSetOutcome::Reran), 1);
}

#[tokio::test]
async fn checksum_drift_on_plain_change_set_fails_validation() {
    let (mut executor, _log) = engine(MemoryConnection::new());

    let mut original = ChangeLog::new("changelog.toml");
    original.push(ChangeSet::new("1", "a", "changelog.toml").change(Change::Sql {
        sql: "CREATE VIEW v AS SELECT 1".to_string(),
        rollback: None,
    }));
    executor.update(&original).await.unwrap();

    let mut modified = ChangeLog::new("changelog.toml");
    modified.push(ChangeSet::new("1", "a", "changelog.toml").change(Change::Sql {
        sql: "CREATE VIEW v AS SELECT 2".to_string(),
        rollback: None,
    }));

    let err = executor.update(&modified).await.unwrap_err();
    match err {
        MigrationError::Validation(errors) => {
            assert!(errors.issues()[0].message.contains("checksum mismatch"));
        }
        other => panic!("expected a validation error, got: {other}"),
    }
}

/// Ledger rows written under checksum algorithm v1 still validate after the
/// current version moved on: comparison uses the stored version.
#[tokio::test]
async fn old_checksum_versions_still_validate() {
    let change_set = ChangeSet::new("1", "a", "changelog.toml").change(add_bar_column());
    let v1_checksum = change_set.checksum_versioned(1);
    assert_ne!(v1_checksum, change_set.checksum());

    let mut history = MemoryHistoryService::new();
    history.seed(RanChangeSet {
        id: "1".to_string(),
        author: "a".to_string(),
        filename: "changelog.toml".to_string(),
        checksum: Some(v1_checksum),
        date_executed: chrono::Utc::now(),
        order_executed: 1,
        exec_type: strata_core::ExecType::Executed,
        tag: None,
        description: None,
        comments: None,
        deployment_id: None,
    });

    let database = Database::new(DatabaseKind::Postgres, Box::new(MemoryConnection::new()));
    let mut executor = Executor::new(database, history, MemoryLockService::new());

    let mut changelog = ChangeLog::new("changelog.toml");
    changelog.push(change_set);

    // No checksum error, and nothing to execute.
    let report = executor.update(&changelog).await.unwrap();
    assert_eq!(report.count(ChangeSetOutcome::Skipped), 1);
    assert_eq!(report.executed_count(), 0);
}

#[tokio::test]
async fn cleared_checksums_are_refilled_without_rerunning() {
    let (mut executor, _log) = engine(MemoryConnection::new());

    let mut changelog = ChangeLog::new("changelog.toml");
    changelog.push(ChangeSet::new("1", "a", "changelog.toml").change(add_bar_column()));
    executor.update(&changelog).await.unwrap();

    executor.clear_checksums().await.unwrap();

    let report = executor.update(&changelog).await.unwrap();
    assert_eq!(report.executed_count(), 0);

    let status = executor.status(&changelog).await.unwrap();
    assert!(status.ran[0].checksum.is_some());
}

/// A dry run produces exactly the SQL the real run then executes.
#[tokio::test]
async fn dry_run_matches_real_run() {
    let mut changelog = ChangeLog::new("changelog.toml");
    changelog.push(
        ChangeSet::new("1", "a", "changelog.toml")
            .change(add_bar_column())
            .change(Change::CreateIndex {
                schema: None,
                table: "foo".to_string(),
                index: "idx_foo_bar".to_string(),
                columns: vec!["bar".to_string()],
                unique: false,
            }),
    );

    let (mut executor, log) = engine(MemoryConnection::new());
    let planned = executor.update_sql(&changelog).await.unwrap();
    assert!(log.is_empty());

    let executed = executor.update(&changelog).await.unwrap();
    assert_eq!(planned.statements, executed.statements);
}

#[tokio::test]
async fn context_filter_selects_change_sets() {
    let mut changelog = ChangeLog::new("changelog.toml");
    changelog.push(
        ChangeSet::new("1", "a", "changelog.toml")
            .with_context(strata_core::FilterExpression::parse("prod").unwrap())
            .change(add_bar_column()),
    );

    // Run declares a non-matching context: skipped.
    let connection = MemoryConnection::new();
    let database = Database::new(DatabaseKind::Postgres, Box::new(connection));
    let mut executor = Executor::new(
        database,
        MemoryHistoryService::new(),
        MemoryLockService::new(),
    )
    .with_options(strata_core::RunOptions::new().contexts(["test"]));

    let report = executor.update(&changelog).await.unwrap();
    assert_eq!(report.count(ChangeSetOutcome::Skipped), 1);

    // Run with no contexts at all: everything runs.
    let database = Database::new(DatabaseKind::Postgres, Box::new(MemoryConnection::new()));
    let mut executor = Executor::new(
        database,
        MemoryHistoryService::new(),
        MemoryLockService::new(),
    );
    let report = executor.update(&changelog).await.unwrap();
    assert_eq!(report.executed_count(), 1);
}

#[tokio::test]
async fn failed_execution_halts_and_surfaces_identity() {
    let mut connection = MemoryConnection::new();
    connection.fail_when_contains("beta", "relation already exists");
    let (mut executor, _log) = engine(connection);

    let mut changelog = ChangeLog::new("changelog.toml");
    for (id, table) in [("1", "alpha"), ("2", "beta"), ("3", "gamma")] {
        changelog.push(
            ChangeSet::new(id, "a", "changelog.toml").change(Change::CreateTable {
                schema: None,
                table: table.to_string(),
                columns: vec![ColumnDef::new("id", ColumnType::BigInt)],
            }),
        );
    }

    let err = executor.update(&changelog).await.unwrap_err();
    match err {
        MigrationError::Execution { change_set, .. } => assert_eq!(change_set.id, "2"),
        other => panic!("expected an execution error, got: {other}"),
    }

    // The first set is recorded; the third never started.
    let status = executor.status(&changelog).await.unwrap();
    let ran_ids: Vec<&str> = status.ran.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ran_ids, vec!["1"]);
}

#[tokio::test]
async fn drop_all_removes_infrastructure_tables_last() {
    let mut connection = MemoryConnection::new();
    connection.add_table("users", &["id"]);
    connection.add_table(strata_core::DEFAULT_HISTORY_TABLE, &["id"]);
    connection.add_table(strata_core::DEFAULT_LOCK_TABLE, &["id"]);
    let (mut executor, _log) = engine(connection);

    let dropped = executor.drop_all().await.unwrap();
    assert_eq!(dropped.len(), 3);
    assert_eq!(dropped[0], "users");
    assert_eq!(dropped.last().map(String::as_str), Some(strata_core::DEFAULT_LOCK_TABLE));
}
