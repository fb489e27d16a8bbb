//! Update and rollback execution.
//!
//! The executor drives one changelog against one database: it takes the
//! change log lock, bootstraps the ledger, validates everything up front,
//! then walks change sets forward (update) or in reverse application order
//! (rollback). Execution is strictly sequential; every statement is awaited
//! before the next starts, and the lock is released on success and failure
//! alike.
//!
//! Per change set, the forward direction moves through
//! `NOT_RAN -> {SKIPPED | RUNNING -> {EXECUTED | RERAN | FAILED}}`.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::change::{Change, RollbackSupport};
use crate::changelog::ChangeLog;
use crate::changeset::{ChangeSet, ChangeSetId};
use crate::database::Database;
use crate::error::{MigrateResult, MigrationError};
use crate::generator::GeneratorRegistry;
use crate::history::{ExecType, HistoryService, RanChangeSet, DEFAULT_HISTORY_TABLE};
use crate::lock::{LockInfo, LockService, DEFAULT_LOCK_TABLE};
use crate::precondition::FailAction;
use crate::statement::Statement;

/// Options for one executor run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Active contexts.
    pub contexts: Vec<String>,
    /// Active labels.
    pub labels: Vec<String>,
    /// Lock holder identity, e.g. `user@host`.
    pub actor: String,
    /// How long to keep retrying lock acquisition. Zero fails fast.
    pub lock_wait: Duration,
    /// Delay between lock acquisition attempts.
    pub lock_poll: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            contexts: Vec::new(),
            labels: Vec::new(),
            actor: "strata".to_string(),
            lock_wait: Duration::ZERO,
            lock_poll: Duration::from_secs(1),
        }
    }
}

impl RunOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the active contexts.
    pub fn contexts(mut self, contexts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.contexts = contexts.into_iter().map(Into::into).collect();
        self
    }

    /// Set the active labels.
    pub fn labels(mut self, labels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Set the lock holder identity.
    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    /// Keep retrying lock acquisition for this long.
    pub fn lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }
}

/// Final state of one change set within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSetOutcome {
    /// Executed for the first time.
    Executed,
    /// Re-executed (run-always or run-on-change).
    Reran,
    /// Excluded by a filter, an "already ran" check, or a SKIP precondition.
    Skipped,
    /// Recorded as ran without executing.
    MarkRan,
    /// Failed with fail_on_error disabled; the run continued.
    Failed,
    /// Reversed by a rollback run.
    RolledBack,
}

/// Per-change-set entry in a run report.
#[derive(Debug, Clone)]
pub struct ChangeSetReport {
    /// The change set.
    pub identity: ChangeSetId,
    /// What happened.
    pub outcome: ChangeSetOutcome,
    /// Why, for skips and failures.
    pub reason: Option<String>,
}

/// The result of an update or rollback run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Per change set outcomes, in processing order.
    pub change_sets: Vec<ChangeSetReport>,
    /// SQL executed (or, in dry-run mode, the SQL that would execute).
    pub statements: Vec<String>,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

impl RunReport {
    fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    fn push(
        &mut self,
        identity: ChangeSetId,
        outcome: ChangeSetOutcome,
        reason: Option<String>,
    ) {
        self.change_sets.push(ChangeSetReport {
            identity,
            outcome,
            reason,
        });
    }

    /// Number of change sets with the given outcome.
    pub fn count(&self, outcome: ChangeSetOutcome) -> usize {
        self.change_sets
            .iter()
            .filter(|r| r.outcome == outcome)
            .count()
    }

    /// Number of executed or re-executed change sets.
    pub fn executed_count(&self) -> usize {
        self.count(ChangeSetOutcome::Executed) + self.count(ChangeSetOutcome::Reran)
    }

    /// A one-line summary of the run.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        for (outcome, label) in [
            (ChangeSetOutcome::Executed, "executed"),
            (ChangeSetOutcome::Reran, "reran"),
            (ChangeSetOutcome::RolledBack, "rolled back"),
            (ChangeSetOutcome::MarkRan, "marked ran"),
            (ChangeSetOutcome::Skipped, "skipped"),
            (ChangeSetOutcome::Failed, "failed"),
        ] {
            let count = self.count(outcome);
            if count > 0 {
                parts.push(format!("{count} {label}"));
            }
        }

        if parts.is_empty() {
            "Nothing to do".to_string()
        } else if self.dry_run {
            format!("[dry run] {}", parts.join(", "))
        } else {
            parts.join(", ")
        }
    }
}

/// How far a rollback reaches. The boundary is exclusive for tags: the
/// tagged change set itself stays applied.
#[derive(Debug, Clone)]
pub enum RollbackTarget {
    /// Roll back everything applied after the tag.
    Tag(String),
    /// Roll back the last N applied change sets.
    Count(usize),
    /// Roll back everything applied after the instant.
    ToDate(DateTime<Utc>),
}

/// Database status relative to a changelog.
#[derive(Debug)]
pub struct StatusReport {
    /// Change sets that have not run yet.
    pub pending: Vec<ChangeSetId>,
    /// Ledger rows whose identity no longer appears in the changelog.
    pub unexpected: Vec<ChangeSetId>,
    /// All ledger rows that count as applied.
    pub ran: Vec<RanChangeSet>,
}

impl StatusReport {
    /// Whether the database is up to date with the changelog.
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Observer for change set processing. All methods default to no-ops.
pub trait RunListener: Send {
    /// A change set is about to execute.
    fn change_set_started(&mut self, identity: &ChangeSetId) {
        let _ = identity;
    }

    /// A change set was skipped, with the reason.
    fn change_set_skipped(&mut self, identity: &ChangeSetId, reason: &str) {
        let _ = (identity, reason);
    }

    /// A change set reached a final state.
    fn change_set_finished(&mut self, identity: &ChangeSetId, outcome: ChangeSetOutcome) {
        let _ = (identity, outcome);
    }
}

/// Drives changelogs against one database.
pub struct Executor<H: HistoryService, L: LockService> {
    database: Database,
    history: H,
    lock: L,
    registry: GeneratorRegistry,
    options: RunOptions,
    listener: Option<Box<dyn RunListener>>,
}

impl<H: HistoryService, L: LockService> Executor<H, L> {
    /// Create an executor with the standard generator registry and default
    /// options.
    pub fn new(database: Database, history: H, lock: L) -> Self {
        Self {
            database,
            history,
            lock,
            registry: GeneratorRegistry::standard(),
            options: RunOptions::default(),
            listener: None,
        }
    }

    /// Replace the run options.
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the generator registry.
    pub fn with_registry(mut self, registry: GeneratorRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Attach a listener.
    pub fn with_listener(mut self, listener: Box<dyn RunListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// The wrapped database.
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Mutable access to the wrapped database.
    pub fn database_mut(&mut self) -> &mut Database {
        &mut self.database
    }

    /// Give the database back.
    pub fn into_database(self) -> Database {
        self.database
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Apply every eligible change set, in order.
    pub async fn update(&mut self, changelog: &ChangeLog) -> MigrateResult<RunReport> {
        self.acquire_lock().await?;
        let result = self.update_locked(changelog, false).await;
        self.release_lock().await;
        result
    }

    /// Produce the SQL an update would execute, without executing it or
    /// writing ledger rows.
    pub async fn update_sql(&mut self, changelog: &ChangeLog) -> MigrateResult<RunReport> {
        self.update_locked(changelog, true).await
    }

    async fn update_locked(
        &mut self,
        changelog: &ChangeLog,
        dry_run: bool,
    ) -> MigrateResult<RunReport> {
        self.history.init(&mut self.database).await?;
        let ran = self.history.ran_change_sets(&mut self.database).await?;

        // Everything reportable is collected before anything executes.
        self.validate_against(changelog, &ran)?;

        let mut report = RunReport::new(dry_run);
        for change_set in &changelog.change_sets {
            self.apply_change_set(change_set, &ran, &mut report, dry_run)
                .await?;
        }

        info!(summary = %report.summary(), "update complete");
        Ok(report)
    }

    async fn apply_change_set(
        &mut self,
        change_set: &ChangeSet,
        ran: &[RanChangeSet],
        report: &mut RunReport,
        dry_run: bool,
    ) -> MigrateResult<()> {
        let identity = change_set.identity.clone();

        if !self.database.kind().matches_dbms(&change_set.dbms) {
            let reason = format!(
                "dbms filter '{}' excludes {}",
                change_set.dbms,
                self.database.kind()
            );
            self.skip(report, identity, reason);
            return Ok(());
        }
        if !change_set.context.matches(&self.options.contexts) {
            let reason = format!("context '{}' does not match the run", change_set.context);
            self.skip(report, identity, reason);
            return Ok(());
        }
        if !change_set.labels.matches(&self.options.labels) {
            let reason = format!("labels '{}' do not match the run", change_set.labels);
            self.skip(report, identity, reason);
            return Ok(());
        }

        let existing = ran
            .iter()
            .find(|row| row.matches(change_set) && row.exec_type.ran());

        let mut exec_type = ExecType::Executed;
        if let Some(row) = existing {
            let changed = match &row.checksum {
                Some(stored) => {
                    stored.digest != change_set.checksum_versioned(stored.version).digest
                }
                None => false,
            };

            if change_set.run_always || (change_set.run_on_change && changed) {
                exec_type = ExecType::Reran;
            } else {
                // Cleared checksums are refilled without re-execution.
                if row.checksum.is_none() && !dry_run {
                    self.history
                        .update_checksum(&mut self.database, change_set)
                        .await?;
                    self.database.commit().await?;
                }
                self.skip(report, identity, "already ran".to_string());
                return Ok(());
            }
        }

        for precondition in &change_set.preconditions {
            let holds = if dry_run {
                true
            } else {
                precondition.evaluate(&mut self.database).await?
            };
            if holds {
                continue;
            }

            let message = precondition.describe();
            match precondition.on_fail {
                FailAction::Halt => {
                    return Err(MigrationError::PreconditionHalt {
                        change_set: identity,
                        message,
                    });
                }
                FailAction::Warn => {
                    warn!(change_set = %identity, check = %message, "precondition failed, continuing");
                }
                FailAction::Skip => {
                    self.skip(report, identity, format!("precondition failed: {message}"));
                    return Ok(());
                }
                FailAction::MarkRan => {
                    if !dry_run {
                        self.history
                            .mark_exec_status(&mut self.database, change_set, ExecType::MarkRan)
                            .await?;
                        self.database.commit().await?;
                    }
                    if let Some(listener) = &mut self.listener {
                        listener.change_set_finished(&identity, ChangeSetOutcome::MarkRan);
                    }
                    report.push(
                        identity,
                        ChangeSetOutcome::MarkRan,
                        Some(format!("precondition failed: {message}")),
                    );
                    return Ok(());
                }
            }
        }

        if let Some(listener) = &mut self.listener {
            listener.change_set_started(&identity);
        }
        if let Some(quoting) = change_set.quoting {
            self.database.set_quoting_strategy(quoting);
        }

        let result = self.execute_changes(&change_set.changes, report, dry_run).await;

        // Per-change-set settings must not leak into the next change set.
        self.database.reset_quoting_strategy();

        match result {
            Ok(()) => {
                if !dry_run {
                    self.history
                        .mark_exec_status(&mut self.database, change_set, exec_type)
                        .await?;
                    self.database.commit().await?;
                }
                let outcome = if exec_type == ExecType::Reran {
                    ChangeSetOutcome::Reran
                } else {
                    ChangeSetOutcome::Executed
                };
                info!(change_set = %identity, exec_type = exec_type.as_str(), "change set applied");
                if let Some(listener) = &mut self.listener {
                    listener.change_set_finished(&identity, outcome);
                }
                report.push(identity, outcome, None);
                Ok(())
            }
            Err(error) => {
                if change_set.fail_on_error {
                    // The partially applied change set is not compensated;
                    // no cross-dialect guarantee makes that safe.
                    return Err(MigrationError::execution(identity, error.to_string()));
                }

                warn!(change_set = %identity, %error, "change set failed, continuing (fail_on_error = false)");
                if !dry_run {
                    self.history
                        .mark_exec_status(&mut self.database, change_set, ExecType::Failed)
                        .await?;
                    self.database.commit().await?;
                }
                if let Some(listener) = &mut self.listener {
                    listener.change_set_finished(&identity, ChangeSetOutcome::Failed);
                }
                report.push(identity, ChangeSetOutcome::Failed, Some(error.to_string()));
                Ok(())
            }
        }
    }

    async fn execute_changes(
        &mut self,
        changes: &[Change],
        report: &mut RunReport,
        dry_run: bool,
    ) -> MigrateResult<()> {
        for change in changes {
            for statement in change.generate_statements(&self.database)? {
                for sql in self.registry.generate(&statement, &self.database)? {
                    report.statements.push(sql.clone());
                    if !dry_run {
                        self.database.execute(&sql).await?;
                    }
                }
            }
        }
        Ok(())
    }

    fn skip(&mut self, report: &mut RunReport, identity: ChangeSetId, reason: String) {
        if let Some(listener) = &mut self.listener {
            listener.change_set_skipped(&identity, &reason);
        }
        info!(change_set = %identity, reason = %reason, "change set skipped");
        report.push(identity, ChangeSetOutcome::Skipped, Some(reason));
    }

    // ------------------------------------------------------------------
    // Rollback
    // ------------------------------------------------------------------

    /// Roll back applied change sets down to the target boundary.
    pub async fn rollback(
        &mut self,
        changelog: &ChangeLog,
        target: RollbackTarget,
    ) -> MigrateResult<RunReport> {
        self.acquire_lock().await?;
        let result = self.rollback_locked(changelog, target, false).await;
        self.release_lock().await;
        result
    }

    /// Produce the SQL a rollback would execute.
    pub async fn rollback_sql(
        &mut self,
        changelog: &ChangeLog,
        target: RollbackTarget,
    ) -> MigrateResult<RunReport> {
        self.rollback_locked(changelog, target, true).await
    }

    async fn rollback_locked(
        &mut self,
        changelog: &ChangeLog,
        target: RollbackTarget,
        dry_run: bool,
    ) -> MigrateResult<RunReport> {
        self.history.init(&mut self.database).await?;
        let ran = self.history.ran_change_sets(&mut self.database).await?;

        let mut applied: Vec<&RanChangeSet> =
            ran.iter().filter(|row| row.exec_type.ran()).collect();
        applied.sort_by_key(|row| row.order_executed);

        // Reverse application order, scoped by the target boundary.
        let scope: Vec<&RanChangeSet> = match &target {
            RollbackTarget::Count(count) => applied.iter().rev().take(*count).copied().collect(),
            RollbackTarget::Tag(tag) => {
                let tag_order = applied
                    .iter()
                    .find(|row| row.tag.as_deref() == Some(tag.as_str()))
                    .map(|row| row.order_executed)
                    .ok_or_else(|| {
                        MigrationError::RollbackTargetNotFound(format!("tag '{tag}'"))
                    })?;
                applied
                    .iter()
                    .rev()
                    .filter(|row| row.order_executed > tag_order)
                    .copied()
                    .collect()
            }
            RollbackTarget::ToDate(date) => applied
                .iter()
                .rev()
                .filter(|row| row.date_executed > *date)
                .copied()
                .collect(),
        };

        // Resolve the whole plan first: a missing change set or a missing
        // inverse aborts before any statement executes.
        let mut plan: Vec<(&ChangeSet, Vec<Change>, ExecType)> = Vec::new();
        for row in &scope {
            let change_set = changelog
                .change_sets
                .iter()
                .find(|cs| row.matches(cs))
                .ok_or_else(|| MigrationError::RollbackImpossible {
                    change_set: row.identity(),
                    reason: "not present in the changelog".to_string(),
                })?;

            match change_set.rollback_changes() {
                RollbackSupport::Supported(changes) => {
                    plan.push((change_set, changes, row.exec_type));
                }
                RollbackSupport::Unsupported(reason) => {
                    return Err(MigrationError::RollbackImpossible {
                        change_set: change_set.identity.clone(),
                        reason: reason.to_string(),
                    });
                }
            }
        }

        let mut report = RunReport::new(dry_run);
        for (change_set, changes, exec_type) in plan {
            // MARK_RAN rows never executed; only the ledger row goes.
            if exec_type != ExecType::MarkRan {
                let result = self.execute_changes(&changes, &mut report, dry_run).await;
                if let Err(error) = result {
                    return Err(MigrationError::execution(
                        change_set.identity.clone(),
                        error.to_string(),
                    ));
                }
            }

            if !dry_run {
                self.history
                    .remove_ran_status(&mut self.database, &change_set.identity)
                    .await?;
                self.database.commit().await?;
            }
            info!(change_set = %change_set.identity, "change set rolled back");
            if let Some(listener) = &mut self.listener {
                listener.change_set_finished(&change_set.identity, ChangeSetOutcome::RolledBack);
            }
            report.push(
                change_set.identity.clone(),
                ChangeSetOutcome::RolledBack,
                None,
            );
        }

        Ok(report)
    }

    // ------------------------------------------------------------------
    // Auxiliary operations
    // ------------------------------------------------------------------

    /// Validate the changelog against the database and ledger without
    /// executing anything: per-change-set issues, duplicate identities, and
    /// checksum drift, all collected into one error.
    pub async fn validate(&mut self, changelog: &ChangeLog) -> MigrateResult<()> {
        self.history.init(&mut self.database).await?;
        let ran = self.history.ran_change_sets(&mut self.database).await?;
        self.validate_against(changelog, &ran)
    }

    fn validate_against(
        &self,
        changelog: &ChangeLog,
        ran: &[RanChangeSet],
    ) -> MigrateResult<()> {
        let mut errors = changelog.validate(&self.database, &self.registry);

        for change_set in &changelog.change_sets {
            // A changed checksum is legitimate on rerunnable sets.
            if change_set.run_on_change || change_set.run_always {
                continue;
            }
            let row = ran
                .iter()
                .find(|row| row.matches(change_set) && row.exec_type.ran());
            if let Some(stored) = row.and_then(|row| row.checksum.as_ref()) {
                // Compare under the stored algorithm version, not the
                // current one.
                let computed = change_set.checksum_versioned(stored.version);
                if computed.digest != stored.digest {
                    errors.push_for(
                        change_set.identity.clone(),
                        format!("checksum mismatch: ledger has {stored}, changelog computes {computed}"),
                    );
                }
            }
        }

        errors.into_result()
    }

    /// Report pending and unexpected change sets.
    pub async fn status(&mut self, changelog: &ChangeLog) -> MigrateResult<StatusReport> {
        self.history.init(&mut self.database).await?;
        let ran: Vec<RanChangeSet> = self
            .history
            .ran_change_sets(&mut self.database)
            .await?
            .into_iter()
            .filter(|row| row.exec_type.ran())
            .collect();

        let pending = changelog
            .change_sets
            .iter()
            .filter(|cs| !ran.iter().any(|row| row.matches(cs)))
            .map(|cs| cs.identity.clone())
            .collect();

        let unexpected = ran
            .iter()
            .filter(|row| !changelog.change_sets.iter().any(|cs| row.matches(cs)))
            .map(RanChangeSet::identity)
            .collect();

        Ok(StatusReport {
            pending,
            unexpected,
            ran,
        })
    }

    /// Mark every unran, eligible change set as ran without executing it.
    pub async fn changelog_sync(&mut self, changelog: &ChangeLog) -> MigrateResult<RunReport> {
        self.acquire_lock().await?;
        let result = self.sync_locked(changelog).await;
        self.release_lock().await;
        result
    }

    async fn sync_locked(&mut self, changelog: &ChangeLog) -> MigrateResult<RunReport> {
        self.history.init(&mut self.database).await?;
        let ran = self.history.ran_change_sets(&mut self.database).await?;

        let mut report = RunReport::new(false);
        for change_set in &changelog.change_sets {
            if !self.database.kind().matches_dbms(&change_set.dbms)
                || !change_set.context.matches(&self.options.contexts)
                || !change_set.labels.matches(&self.options.labels)
                || ran
                    .iter()
                    .any(|row| row.matches(change_set) && row.exec_type.ran())
            {
                continue;
            }

            self.history
                .mark_exec_status(&mut self.database, change_set, ExecType::MarkRan)
                .await?;
            self.database.commit().await?;
            report.push(change_set.identity.clone(), ChangeSetOutcome::MarkRan, None);
        }

        Ok(report)
    }

    /// Tag the most recently applied change set as a rollback anchor.
    pub async fn tag(&mut self, label: &str) -> MigrateResult<()> {
        self.acquire_lock().await?;
        let result = async {
            self.history.init(&mut self.database).await?;
            self.history.tag(&mut self.database, label).await?;
            self.database.commit().await
        }
        .await;
        self.release_lock().await;
        result
    }

    /// Whether a tag exists in the ledger.
    pub async fn tag_exists(&mut self, label: &str) -> MigrateResult<bool> {
        self.history.init(&mut self.database).await?;
        self.history.tag_exists(&mut self.database, label).await
    }

    /// Null out stored checksums; the next update refills them.
    pub async fn clear_checksums(&mut self) -> MigrateResult<()> {
        self.acquire_lock().await?;
        let result = async {
            self.history.init(&mut self.database).await?;
            self.history.clear_checksums(&mut self.database).await?;
            self.database.commit().await
        }
        .await;
        self.release_lock().await;
        result
    }

    /// Current lock holders.
    pub async fn list_locks(&mut self) -> MigrateResult<Vec<LockInfo>> {
        self.lock.init(&mut self.database).await?;
        self.lock.list_locks(&mut self.database).await
    }

    /// Force-release the change log lock.
    pub async fn release_locks(&mut self) -> MigrateResult<()> {
        self.lock.init(&mut self.database).await?;
        self.lock.force_release(&mut self.database).await
    }

    /// Drop every table in the default schema, infrastructure tables last.
    /// Returns the dropped table names.
    pub async fn drop_all(&mut self) -> MigrateResult<Vec<String>> {
        self.acquire_lock().await?;
        let result = self.drop_all_locked().await;
        // The lock table may be gone by now; release is best effort.
        self.release_lock().await;
        result
    }

    async fn drop_all_locked(&mut self) -> MigrateResult<Vec<String>> {
        let tables = self.database.list_tables().await?;
        let (infra, user): (Vec<String>, Vec<String>) = tables.into_iter().partition(|name| {
            name.as_str() == DEFAULT_HISTORY_TABLE || name.as_str() == DEFAULT_LOCK_TABLE
        });

        let mut dropped = Vec::new();
        for table in user.into_iter().chain(infra) {
            let statement = Statement::DropTable {
                schema: None,
                table: table.clone(),
                cascade: true,
            };
            for sql in self.registry.generate(&statement, &self.database)? {
                self.database.execute(&sql).await?;
            }
            dropped.push(table);
        }
        self.database.commit().await?;
        Ok(dropped)
    }

    // ------------------------------------------------------------------
    // Locking
    // ------------------------------------------------------------------

    async fn acquire_lock(&mut self) -> MigrateResult<()> {
        self.lock.init(&mut self.database).await?;

        let deadline = Instant::now() + self.options.lock_wait;
        loop {
            if self
                .lock
                .acquire(&mut self.database, &self.options.actor)
                .await?
            {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(MigrationError::lock_unavailable(
                    "another process holds the change log lock",
                ));
            }
            tokio::time::sleep(self.options.lock_poll).await;
        }
    }

    async fn release_lock(&mut self) {
        // Release must not mask the run's own result.
        if let Err(error) = self.lock.release(&mut self.database).await {
            warn!(%error, "failed to release the change log lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DatabaseKind, MemoryConnection, StatementLog};
    use crate::history::MemoryHistoryService;
    use crate::lock::MemoryLockService;
    use crate::statement::{ColumnDef, ColumnType};

    fn changelog_with_create() -> ChangeLog {
        let mut changelog = ChangeLog::new("changelog.toml");
        changelog.push(
            ChangeSet::new("1", "alice", "changelog.toml").change(Change::CreateTable {
                schema: None,
                table: "users".to_string(),
                columns: vec![ColumnDef::new("id", ColumnType::BigInt).primary_key()],
            }),
        );
        changelog
    }

    fn executor() -> (
        Executor<MemoryHistoryService, MemoryLockService>,
        StatementLog,
    ) {
        let connection = MemoryConnection::new();
        let log = connection.log_handle();
        let database = Database::new(DatabaseKind::Postgres, Box::new(connection));
        (
            Executor::new(database, MemoryHistoryService::new(), MemoryLockService::new()),
            log,
        )
    }

    #[tokio::test]
    async fn test_update_executes_and_reports() {
        let (mut executor, log) = executor();
        let changelog = changelog_with_create();

        let report = executor.update(&changelog).await.unwrap();
        assert_eq!(report.executed_count(), 1);
        assert_eq!(report.statements.len(), 1);
        assert!(log
            .statements()
            .iter()
            .any(|sql| sql.starts_with("CREATE TABLE users")));
    }

    #[tokio::test]
    async fn test_dry_run_executes_nothing() {
        let (mut executor, log) = executor();
        let changelog = changelog_with_create();

        let report = executor.update_sql(&changelog).await.unwrap();
        assert_eq!(report.statements.len(), 1);
        assert!(report.dry_run);
        assert!(log.is_empty());
        assert!(report.summary().starts_with("[dry run]"));
    }

    #[tokio::test]
    async fn test_lock_released_after_failed_run() {
        let mut connection = MemoryConnection::new();
        connection.fail_when_contains("CREATE TABLE users", "permission denied");
        let database = Database::new(DatabaseKind::Postgres, Box::new(connection));
        let lock = MemoryLockService::new();
        let mut probe = lock.clone();
        let mut executor = Executor::new(database, MemoryHistoryService::new(), lock);

        let err = executor.update(&changelog_with_create()).await.unwrap_err();
        assert!(matches!(err, MigrationError::Execution { .. }));

        // Lock must be free again even though the run failed.
        let mut other_db = Database::new(DatabaseKind::Postgres, Box::new(MemoryConnection::new()));
        assert!(probe.acquire(&mut other_db, "probe").await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_unavailable_is_distinct() {
        let lock = MemoryLockService::new();
        let mut holder = lock.clone();
        let mut holder_db =
            Database::new(DatabaseKind::Postgres, Box::new(MemoryConnection::new()));
        holder.acquire(&mut holder_db, "other-process").await.unwrap();

        let (database, history) = (
            Database::new(DatabaseKind::Postgres, Box::new(MemoryConnection::new())),
            MemoryHistoryService::new(),
        );
        let mut executor = Executor::new(database, history, lock);
        let err = executor.update(&changelog_with_create()).await.unwrap_err();
        assert!(err.is_lock_unavailable());
    }

    #[tokio::test]
    async fn test_dbms_filter_skips() {
        let (mut executor, log) = executor();
        let mut changelog = ChangeLog::new("c.toml");
        changelog.push(
            ChangeSet::new("1", "alice", "c.toml")
                .with_dbms("mysql")
                .change(Change::Sql {
                    sql: "SELECT 1".to_string(),
                    rollback: None,
                }),
        );

        let report = executor.update(&changelog).await.unwrap();
        assert_eq!(report.count(ChangeSetOutcome::Skipped), 1);
        assert!(report.change_sets[0]
            .reason
            .as_deref()
            .unwrap()
            .contains("dbms"));
        assert!(log.statements().iter().all(|sql| !sql.contains("SELECT 1")));
    }

    #[tokio::test]
    async fn test_fail_on_error_false_records_and_continues() {
        let mut connection = MemoryConnection::new();
        connection.fail_when_contains("DROP TABLE legacy", "no such table");
        let database = Database::new(DatabaseKind::Postgres, Box::new(connection));
        let mut executor =
            Executor::new(database, MemoryHistoryService::new(), MemoryLockService::new());

        let mut changelog = ChangeLog::new("c.toml");
        changelog.push(
            ChangeSet::new("1", "alice", "c.toml")
                .fail_on_error(false)
                .change(Change::DropTable {
                    schema: None,
                    table: "legacy".to_string(),
                    cascade: false,
                }),
        );
        changelog.push(ChangeSet::new("2", "alice", "c.toml").change(Change::Sql {
            sql: "SELECT 1".to_string(),
            rollback: None,
        }));

        let report = executor.update(&changelog).await.unwrap();
        assert_eq!(report.count(ChangeSetOutcome::Failed), 1);
        assert_eq!(report.count(ChangeSetOutcome::Executed), 1);
    }

    #[tokio::test]
    async fn test_quoting_strategy_reset_between_change_sets() {
        let (mut executor, log) = executor();
        let mut changelog = ChangeLog::new("c.toml");
        changelog.push(
            ChangeSet::new("1", "alice", "c.toml")
                .with_quoting(crate::database::QuotingStrategy::QuoteAll)
                .change(Change::DropTable {
                    schema: None,
                    table: "old_users".to_string(),
                    cascade: false,
                }),
        );
        changelog.push(ChangeSet::new("2", "alice", "c.toml").change(Change::DropTable {
            schema: None,
            table: "old_posts".to_string(),
            cascade: false,
        }));

        executor.update(&changelog).await.unwrap();
        let statements = log.statements();
        assert!(statements.iter().any(|sql| sql.contains("\"old_users\"")));
        // The second set is back on the default strategy.
        assert!(statements.iter().any(|sql| sql.contains("DROP TABLE old_posts")));
    }

    #[tokio::test]
    async fn test_rollback_target_not_found() {
        let (mut executor, _log) = executor();
        let changelog = changelog_with_create();
        executor.update(&changelog).await.unwrap();

        let err = executor
            .rollback(&changelog, RollbackTarget::Tag("v9".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::RollbackTargetNotFound(_)));
    }

    #[tokio::test]
    async fn test_rollback_impossible_raised_before_execution() {
        let (mut executor, log) = executor();
        let mut changelog = ChangeLog::new("c.toml");
        changelog.push(
            ChangeSet::new("1", "alice", "c.toml").change(Change::CreateTable {
                schema: None,
                table: "users".to_string(),
                columns: vec![ColumnDef::new("id", ColumnType::BigInt)],
            }),
        );
        // Not invertible and no explicit rollback.
        changelog.push(ChangeSet::new("2", "alice", "c.toml").change(Change::Update {
            schema: None,
            table: "users".to_string(),
            column: "id".to_string(),
            value: crate::statement::DefaultValue::Numeric("0".to_string()),
            where_clause: None,
        }));

        executor.update(&changelog).await.unwrap();
        let before = log.len();

        let err = executor
            .rollback(&changelog, RollbackTarget::Count(2))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::RollbackImpossible { .. }));
        // Nothing executed: the plan failed before the first statement.
        assert!(log
            .statements()
            .iter()
            .skip(before)
            .all(|sql| !sql.starts_with("DROP")));
    }

    #[tokio::test]
    async fn test_status_reports_pending_and_unexpected() {
        let (mut executor, _log) = executor();
        let changelog = changelog_with_create();
        executor.update(&changelog).await.unwrap();

        // A second changelog that no longer contains the applied set.
        let mut newer = ChangeLog::new("changelog.toml");
        newer.push(ChangeSet::new("2", "alice", "changelog.toml").change(Change::Sql {
            sql: "SELECT 1".to_string(),
            rollback: None,
        }));

        let status = executor.status(&newer).await.unwrap();
        assert_eq!(status.pending.len(), 1);
        assert_eq!(status.pending[0].id, "2");
        assert_eq!(status.unexpected.len(), 1);
        assert_eq!(status.unexpected[0].id, "1");
        assert!(!status.is_up_to_date());
    }

    #[tokio::test]
    async fn test_changelog_sync_marks_without_executing() {
        let (mut executor, log) = executor();
        let changelog = changelog_with_create();

        let report = executor.changelog_sync(&changelog).await.unwrap();
        assert_eq!(report.count(ChangeSetOutcome::MarkRan), 1);
        assert!(log
            .statements()
            .iter()
            .all(|sql| !sql.starts_with("CREATE TABLE users")));

        // A subsequent update has nothing to do.
        let report = executor.update(&changelog).await.unwrap();
        assert_eq!(report.executed_count(), 0);
    }
}
