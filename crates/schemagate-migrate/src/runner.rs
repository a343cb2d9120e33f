//! Migration runner.
//!
//! Deciding what to run is the pure function [`plan`]; [`MigrationRunner`]
//! then applies that plan strictly in order, one transaction per
//! migration, and stops at the first failure.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use schemagate_core::{CompiledQuery, Schema};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::client::{RecordingClient, TransactionalClient};
use crate::error::{MigrateError, Result};
use crate::history::{HistoryEntry, HistoryStore, MigrationState};
use crate::migration::{Migration, MigrationContext, MigrationSet};

/// Which body of a migration to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `up`
    Up,
    /// `down`
    Down,
}

/// Operator decision for a failed or incomplete migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The change was completed by hand; record it as applied.
    MarkSucceeded,
    /// Forget the attempt so the next run applies the migration again.
    Retry,
}

/// The migrations `migrate` would apply, in order.
///
/// A migration is pending unless its history entry says it succeeded.
///
/// # Errors
///
/// - [`MigrateError::OutOfOrderMigration`] if an applied migration sorts
///   after a pending one.
/// - [`MigrateError::UnresolvedMigration`] if a pending migration has a
///   failed or incomplete entry.
pub fn plan<'m>(
    migrations: &'m MigrationSet,
    history: &[HistoryEntry],
) -> Result<Vec<&'m dyn Migration>> {
    let entries: BTreeMap<&str, &HistoryEntry> =
        history.iter().map(|e| (e.name.as_str(), e)).collect();

    let mut pending: Vec<&'m dyn Migration> = Vec::new();
    for migration in migrations.iter() {
        let state = entries
            .get(migration.name())
            .map_or(MigrationState::Pending, |e| e.state());
        if state == MigrationState::Applied {
            if let Some(first) = pending.first() {
                return Err(MigrateError::OutOfOrderMigration {
                    migration: migration.name().to_string(),
                    pending: first.name().to_string(),
                });
            }
        } else {
            pending.push(migration);
        }
    }

    for migration in &pending {
        if let Some(entry) = entries.get(migration.name()) {
            return Err(MigrateError::UnresolvedMigration {
                name: migration.name().to_string(),
                state: entry.state(),
            });
        }
    }

    Ok(pending)
}

/// One line of [`StatusReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    /// Migration name.
    pub name: String,
    /// Where it stands.
    pub state: MigrationState,
    /// When it was last started, if ever.
    pub started: Option<DateTime<Utc>>,
    /// Schema hash it declares.
    pub accepts_schema_hash: Option<String>,
}

/// Every known migration with its state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Migrations in name order.
    pub migrations: Vec<MigrationStatus>,
    /// History entries whose migration is no longer known.
    pub unknown: Vec<HistoryEntry>,
}

impl StatusReport {
    /// Builds the report from a migration set and its history.
    #[must_use]
    pub fn new(migrations: &MigrationSet, history: Vec<HistoryEntry>) -> Self {
        let mut entries: BTreeMap<String, HistoryEntry> =
            history.into_iter().map(|e| (e.name.clone(), e)).collect();
        let migrations = migrations
            .iter()
            .map(|m| {
                let entry = entries.remove(m.name());
                MigrationStatus {
                    name: m.name().to_string(),
                    state: entry
                        .as_ref()
                        .map_or(MigrationState::Pending, HistoryEntry::state),
                    started: entry.map(|e| e.started),
                    accepts_schema_hash: m.accepts_schema_hash().map(str::to_string),
                }
            })
            .collect();
        Self {
            migrations,
            unknown: entries.into_values().collect(),
        }
    }
}

/// Applies migrations to a database and keeps the history current.
pub struct MigrationRunner<C, H> {
    client: C,
    history: H,
    schema: Arc<Schema>,
    migrations: MigrationSet,
}

impl<C: TransactionalClient, H: HistoryStore> MigrationRunner<C, H> {
    /// Creates a runner.
    pub const fn new(client: C, history: H, schema: Arc<Schema>, migrations: MigrationSet) -> Self {
        Self {
            client,
            history,
            schema,
            migrations,
        }
    }

    /// The client migrations run on.
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// The history store.
    pub const fn history(&self) -> &H {
        &self.history
    }

    /// The declared schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The known migrations.
    pub const fn migrations(&self) -> &MigrationSet {
        &self.migrations
    }

    /// Ensures the history table exists.
    ///
    /// # Errors
    ///
    /// Propagates history store errors.
    pub async fn init(&self) -> Result<()> {
        self.history.ensure_table().await
    }

    /// Every migration with its state.
    ///
    /// # Errors
    ///
    /// Propagates history store errors.
    pub async fn status(&self) -> Result<StatusReport> {
        let entries = self.history.entries().await?;
        Ok(StatusReport::new(&self.migrations, entries))
    }

    /// Names of the migrations `migrate` would apply.
    ///
    /// # Errors
    ///
    /// See [`plan`].
    pub async fn pending(&self) -> Result<Vec<String>> {
        let entries = self.history.entries().await?;
        Ok(plan(&self.migrations, &entries)?
            .into_iter()
            .map(|m| m.name().to_string())
            .collect())
    }

    /// Applies every pending migration in order and returns their names.
    ///
    /// Stops at the first failure; migrations applied before it stay applied.
    ///
    /// # Errors
    ///
    /// See [`plan`]; a failing body yields
    /// [`MigrateError::MigrationExecution`], except that connection errors
    /// surface unchanged.
    pub async fn migrate(&self) -> Result<Vec<String>> {
        let entries = self.history.entries().await?;
        self.warn_unknown(&entries);
        let pending = plan(&self.migrations, &entries)?;
        if pending.is_empty() {
            info!("No migrations to apply");
            return Ok(Vec::new());
        }

        let mut applied = Vec::with_capacity(pending.len());
        for migration in pending {
            self.execute(migration).await?;
            applied.push(migration.name().to_string());
        }
        info!(count = applied.len(), "Migrations applied");
        Ok(applied)
    }

    /// Applies one migration. Returns `false` if it was already applied.
    ///
    /// # Errors
    ///
    /// [`MigrateError::OutOfOrderMigration`] if an earlier migration has not
    /// been applied, plus everything [`migrate`](Self::migrate) can return.
    pub async fn apply(&self, name: &str) -> Result<bool> {
        let migration = self.migrations.require(name)?;
        let entries = self.history.entries().await?;
        let entries: BTreeMap<&str, &HistoryEntry> =
            entries.iter().map(|e| (e.name.as_str(), e)).collect();

        match entries.get(name).map(|e| e.state()) {
            Some(MigrationState::Applied) => {
                warn!(migration = %name, "Migration already applied, skipping");
                return Ok(false);
            }
            Some(state) => {
                return Err(MigrateError::UnresolvedMigration {
                    name: name.to_string(),
                    state,
                })
            }
            None => {}
        }

        let earlier_pending = self
            .migrations
            .iter()
            .take_while(|m| m.name() != name)
            .find(|m| entries.get(m.name()).map(|e| e.state()) != Some(MigrationState::Applied));
        if let Some(earlier) = earlier_pending {
            return Err(MigrateError::OutOfOrderMigration {
                migration: name.to_string(),
                pending: earlier.name().to_string(),
            });
        }

        self.execute(migration).await?;
        Ok(true)
    }

    /// Runs a migration's `down` and removes its history entry.
    ///
    /// Local tooling only; forward progress never rolls back.
    ///
    /// # Errors
    ///
    /// - [`MigrateError::MigrationNotFound`] if the migration or its entry is unknown.
    /// - [`MigrateError::NotReversible`] if it has no `down`.
    /// - [`MigrateError::InvalidState`] if a later migration is still applied.
    pub async fn rollback(&self, name: &str) -> Result<()> {
        let migration = self.migrations.require(name)?;
        if !migration.is_reversible() {
            return Err(MigrateError::NotReversible(name.to_string()));
        }

        let entries = self.history.entries().await?;
        if !entries.iter().any(|e| e.name == name) {
            return Err(MigrateError::MigrationNotFound(name.to_string()));
        }
        if let Some(later) = entries
            .iter()
            .find(|e| e.name.as_str() > name && e.state() == MigrationState::Applied)
        {
            return Err(MigrateError::InvalidState(format!(
                "cannot roll back '{name}' while the later migration '{}' is applied",
                later.name
            )));
        }

        info!(migration = %name, "Rolling back migration");
        self.in_transaction(migration, Direction::Down)
            .await
            .map_err(|err| execution_error(name, err))?;
        self.history.remove(name).await?;
        info!(migration = %name, "Migration rolled back");
        Ok(())
    }

    /// Clears a failed or incomplete history entry.
    ///
    /// # Errors
    ///
    /// [`MigrateError::MigrationNotFound`] if there is no entry;
    /// [`MigrateError::InvalidState`] if the entry already succeeded.
    pub async fn resolve(&self, name: &str, resolution: Resolution) -> Result<()> {
        let entries = self.history.entries().await?;
        let entry = entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| MigrateError::MigrationNotFound(name.to_string()))?;
        if entry.state() == MigrationState::Applied {
            return Err(MigrateError::InvalidState(format!(
                "migration '{name}' already succeeded; nothing to resolve"
            )));
        }

        match resolution {
            Resolution::MarkSucceeded => self.history.mark_succeeded(name).await?,
            Resolution::Retry => self.history.remove(name).await?,
        }
        info!(migration = %name, resolution = ?resolution, "Migration resolved");
        Ok(())
    }

    async fn execute(&self, migration: &dyn Migration) -> Result<()> {
        let name = migration.name();
        info!(migration = %name, "Applying migration");
        self.history.record_started(name, Utc::now()).await?;

        match self.in_transaction(migration, Direction::Up).await {
            Ok(()) => {
                self.history.record_finished(name, true).await?;
                info!(migration = %name, "Migration applied successfully");
                Ok(())
            }
            Err(err) => {
                error!(migration = %name, error = %err, "Migration failed");
                if let Err(history_err) = self.history.record_finished(name, false).await {
                    warn!(
                        migration = %name,
                        error = %history_err,
                        "Could not record migration failure; entry stays incomplete"
                    );
                }
                Err(execution_error(name, err))
            }
        }
    }

    async fn in_transaction(&self, migration: &dyn Migration, direction: Direction) -> Result<()> {
        let mut tx = self.client.begin().await?;
        let outcome = {
            let ctx = MigrationContext::new(tx.as_client(), &self.schema);
            match direction {
                Direction::Up => migration.up(&ctx).await,
                Direction::Down => migration.down(&ctx).await,
            }
        };

        match outcome {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(
                        migration = %migration.name(),
                        error = %rollback_err,
                        "Rollback failed"
                    );
                }
                Err(err)
            }
        }
    }

    fn warn_unknown(&self, entries: &[HistoryEntry]) {
        for entry in entries {
            if self.migrations.get(&entry.name).is_none() {
                warn!(migration = %entry.name, "History entry has no matching migration");
            }
        }
    }
}

fn execution_error(name: &str, err: MigrateError) -> MigrateError {
    if err.is_connection() {
        err
    } else {
        MigrateError::MigrationExecution {
            name: name.to_string(),
            source: Box::new(err),
        }
    }
}

/// Runs a migration body against a [`RecordingClient`] and returns the
/// statements it would execute.
///
/// Bodies that read from the database see empty results.
///
/// # Errors
///
/// Whatever the body raises.
pub async fn preview(
    migration: &dyn Migration,
    schema: &Schema,
    direction: Direction,
) -> Result<Vec<CompiledQuery>> {
    let client = RecordingClient::new();
    let ctx = MigrationContext::new(&client, schema);
    match direction {
        Direction::Up => migration.up(&ctx).await?,
        Direction::Down => migration.down(&ctx).await?,
    }
    Ok(client.executed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use crate::history::MemoryHistoryStore;
    use crate::migration::StaticMigration;
    use chrono::TimeZone;

    const fn migration(name: &'static str, up: &'static [&'static str]) -> StaticMigration {
        StaticMigration {
            name,
            accepts_schema_hash: None,
            up,
            down: Some(&["SELECT 'down'"]),
        }
    }

    const M1: StaticMigration = migration("001_a", &["SELECT 1"]);
    const M2: StaticMigration = migration("002_b", &["SELECT 2"]);
    const M3: StaticMigration = migration("003_c", &["SELECT 3"]);

    fn set() -> MigrationSet {
        MigrationSet::from_static(&[M1, M2, M3]).unwrap()
    }

    fn entry(name: &str, finished: bool, succeeded: bool) -> HistoryEntry {
        HistoryEntry {
            name: name.to_string(),
            started: Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap(),
            finished,
            succeeded,
        }
    }

    fn names(plan: &[&dyn Migration]) -> Vec<String> {
        plan.iter().map(|m| m.name().to_string()).collect()
    }

    fn runner(
        client: RecordingClient,
        history: MemoryHistoryStore,
    ) -> MigrationRunner<RecordingClient, MemoryHistoryStore> {
        MigrationRunner::new(client, history, Arc::new(Schema::default()), set())
    }

    // ===== plan =====

    #[test]
    fn test_plan_everything_pending() {
        let set = set();
        assert_eq!(
            names(&plan(&set, &[]).unwrap()),
            ["001_a", "002_b", "003_c"]
        );
    }

    #[test]
    fn test_plan_skips_applied_prefix() {
        let set = set();
        let history = [entry("001_a", true, true)];
        assert_eq!(names(&plan(&set, &history).unwrap()), ["002_b", "003_c"]);
    }

    #[test]
    fn test_plan_detects_gap() {
        let set = set();
        let history = [entry("001_a", true, true), entry("003_c", true, true)];
        let err = plan(&set, &history).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::OutOfOrderMigration { ref migration, ref pending }
                if migration == "003_c" && pending == "002_b"
        ));
    }

    #[test]
    fn test_plan_blocks_on_failed_and_incomplete() {
        let set = set();
        let err = plan(&set, &[entry("001_a", true, false)]).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::UnresolvedMigration { state: MigrationState::Failed, .. }
        ));

        let err = plan(&set, &[entry("001_a", false, false)]).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::UnresolvedMigration { state: MigrationState::Incomplete, .. }
        ));
    }

    #[test]
    fn test_plan_ignores_unknown_entries() {
        let set = set();
        let history = [entry("000_gone", true, true)];
        assert_eq!(plan(&set, &history).unwrap().len(), 3);
    }

    #[test]
    fn test_status_report() {
        let report = StatusReport::new(
            &set(),
            vec![
                entry("001_a", true, true),
                entry("002_b", false, false),
                entry("000_gone", true, true),
            ],
        );
        let states: Vec<MigrationState> = report.migrations.iter().map(|m| m.state).collect();
        assert_eq!(
            states,
            [
                MigrationState::Applied,
                MigrationState::Incomplete,
                MigrationState::Pending
            ]
        );
        assert_eq!(report.unknown.len(), 1);
        assert_eq!(report.unknown[0].name, "000_gone");
    }

    // ===== runner =====

    #[tokio::test]
    async fn test_migrate_applies_in_order_and_is_idempotent() {
        let client = RecordingClient::new();
        let history = MemoryHistoryStore::new();
        let runner = runner(client.clone(), history.clone());

        assert_eq!(runner.migrate().await.unwrap(), ["001_a", "002_b", "003_c"]);
        assert_eq!(client.statements(), ["SELECT 1", "SELECT 2", "SELECT 3"]);
        assert_eq!(client.commits(), 3);
        assert!(history
            .snapshot()
            .iter()
            .all(|e| e.state() == MigrationState::Applied));

        assert!(runner.migrate().await.unwrap().is_empty());
        assert_eq!(client.statements().len(), 3);
    }

    #[tokio::test]
    async fn test_migrate_stops_at_first_failure() {
        let client = RecordingClient::new().fail_on("SELECT 2");
        let history = MemoryHistoryStore::new();
        let runner = runner(client.clone(), history.clone());

        let err = runner.migrate().await.unwrap_err();
        assert!(matches!(
            err,
            MigrateError::MigrationExecution { ref name, .. } if name == "002_b"
        ));
        assert_eq!(client.statements(), ["SELECT 1"]);
        assert_eq!(client.rollbacks(), 1);

        let entries = history.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].state(), MigrationState::Applied);
        assert_eq!(entries[1].state(), MigrationState::Failed);

        let err = runner.migrate().await.unwrap_err();
        assert!(matches!(err, MigrateError::UnresolvedMigration { .. }));
    }

    #[tokio::test]
    async fn test_connection_errors_surface_unchanged() {
        struct Unreachable;

        #[async_trait::async_trait]
        impl Migration for Unreachable {
            fn name(&self) -> &str {
                "001_a"
            }

            async fn up(&self, _ctx: &MigrationContext<'_>) -> Result<()> {
                Err(ClientError::Connection("connection refused".into()).into())
            }
        }

        let history = MemoryHistoryStore::new();
        let runner = MigrationRunner::new(
            RecordingClient::new(),
            history.clone(),
            Arc::new(Schema::default()),
            MigrationSet::new(vec![Box::new(Unreachable)]).unwrap(),
        );
        let err = runner.migrate().await.unwrap_err();
        assert!(err.is_connection());
        assert_eq!(history.snapshot()[0].state(), MigrationState::Failed);
    }

    #[tokio::test]
    async fn test_rollback_refuses_migration_without_down() {
        struct UpOnly;

        #[async_trait::async_trait]
        impl Migration for UpOnly {
            fn name(&self) -> &str {
                "001_a"
            }

            async fn up(&self, _ctx: &MigrationContext<'_>) -> Result<()> {
                Ok(())
            }
        }

        assert!(!UpOnly.is_reversible());
        let history = MemoryHistoryStore::with_entries([entry("001_a", true, true)]);
        let client = RecordingClient::new();
        let runner = MigrationRunner::new(
            client.clone(),
            history.clone(),
            Arc::new(Schema::default()),
            MigrationSet::new(vec![Box::new(UpOnly)]).unwrap(),
        );

        let err = runner.rollback("001_a").await.unwrap_err();
        assert!(matches!(err, MigrateError::NotReversible(name) if name == "001_a"));
        assert_eq!(history.snapshot().len(), 1);
        assert!(client.statements().is_empty());
    }

    #[tokio::test]
    async fn test_apply_requires_earlier_migrations() {
        let history = MemoryHistoryStore::with_entries([entry("001_a", true, true)]);
        let client = RecordingClient::new();
        let runner = runner(client.clone(), history);

        let err = runner.apply("003_c").await.unwrap_err();
        assert!(matches!(
            err,
            MigrateError::OutOfOrderMigration { ref pending, .. } if pending == "002_b"
        ));
        assert!(client.statements().is_empty());

        assert!(runner.apply("002_b").await.unwrap());
        assert!(!runner.apply("002_b").await.unwrap());
        assert!(runner.apply("003_c").await.unwrap());
        assert!(matches!(
            runner.apply("004_d").await,
            Err(MigrateError::MigrationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rollback_runs_down_and_forgets_entry() {
        let history = MemoryHistoryStore::new();
        let client = RecordingClient::new();
        let runner = runner(client.clone(), history.clone());
        runner.migrate().await.unwrap();

        let err = runner.rollback("002_b").await.unwrap_err();
        assert!(matches!(err, MigrateError::InvalidState(_)));

        runner.rollback("003_c").await.unwrap();
        assert_eq!(client.statements().last().unwrap(), "SELECT 'down'");
        assert_eq!(runner.pending().await.unwrap(), ["003_c"]);
    }

    #[tokio::test]
    async fn test_resolve() {
        let history = MemoryHistoryStore::with_entries([
            entry("001_a", true, false),
            entry("002_b", false, false),
        ]);
        let runner = runner(RecordingClient::new(), history.clone());

        runner.resolve("001_a", Resolution::MarkSucceeded).await.unwrap();
        runner.resolve("002_b", Resolution::Retry).await.unwrap();
        assert_eq!(runner.pending().await.unwrap(), ["002_b", "003_c"]);

        let err = runner.resolve("001_a", Resolution::Retry).await.unwrap_err();
        assert!(matches!(err, MigrateError::InvalidState(_)));
        let err = runner.resolve("003_c", Resolution::Retry).await.unwrap_err();
        assert!(matches!(err, MigrateError::MigrationNotFound(_)));
    }

    #[tokio::test]
    async fn test_preview_does_not_touch_history() {
        let schema = Schema::default();
        let statements = preview(&M2, &schema, Direction::Up).await.unwrap();
        assert_eq!(statements, [CompiledQuery::unparameterized("SELECT 2")]);

        let statements = preview(&M2, &schema, Direction::Down).await.unwrap();
        assert_eq!(statements[0].sql, "SELECT 'down'");
    }
}
