//! Migration history tracking.
//!
//! This module manages the `migrations` table that records which migrations
//! have run and whether they succeeded. An entry is written before a
//! migration's body runs and finalized afterwards, so a crash leaves it
//! `finished = false`. Entries are only removed by explicit operator
//! actions such as a local rollback.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemagate_core::Query;
use serde::Serialize;

use crate::client::SqlClient;
use crate::error::{MigrateError, Result};

/// Name of the history table.
pub const HISTORY_TABLE: &str = "migrations";

/// SQL to create the history table.
pub const CREATE_MIGRATIONS_TABLE_SQL: &str = r#"CREATE TABLE IF NOT EXISTS "migrations" (
    "name" TEXT PRIMARY KEY,
    "started" TIMESTAMPTZ NOT NULL,
    "finished" BOOL NOT NULL DEFAULT FALSE,
    "succeeded" BOOL NOT NULL DEFAULT FALSE
)"#;

/// Where a migration stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationState {
    /// Finished and succeeded.
    Applied,
    /// No history entry.
    Pending,
    /// Finished without succeeding.
    Failed,
    /// Started but never finished.
    Incomplete,
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Applied => "applied",
            Self::Pending => "pending",
            Self::Failed => "failed",
            Self::Incomplete => "incomplete",
        })
    }
}

/// A row of the history table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// Migration name.
    pub name: String,
    /// When the runner began the migration.
    pub started: DateTime<Utc>,
    /// Whether the runner got to record an outcome.
    pub finished: bool,
    /// Whether the outcome was success.
    pub succeeded: bool,
}

impl HistoryEntry {
    /// A fresh entry for a migration that is about to run.
    #[must_use]
    pub fn started(name: impl Into<String>, started: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            started,
            finished: false,
            succeeded: false,
        }
    }

    /// The state this entry puts its migration in.
    #[must_use]
    pub const fn state(&self) -> MigrationState {
        match (self.finished, self.succeeded) {
            (true, true) => MigrationState::Applied,
            (true, false) => MigrationState::Failed,
            (false, _) => MigrationState::Incomplete,
        }
    }
}

/// Durable record of migration runs.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Creates the backing table if needed. Idempotent.
    async fn ensure_table(&self) -> Result<()>;

    /// All entries, ordered by name.
    async fn entries(&self) -> Result<Vec<HistoryEntry>>;

    /// Inserts an unfinished entry.
    async fn record_started(&self, name: &str, started: DateTime<Utc>) -> Result<()>;

    /// Marks an entry finished with the given outcome.
    async fn record_finished(&self, name: &str, succeeded: bool) -> Result<()>;

    /// Operator action: marks a failed or incomplete entry as succeeded.
    async fn mark_succeeded(&self, name: &str) -> Result<()>;

    /// Operator action: deletes an entry.
    async fn remove(&self, name: &str) -> Result<()>;
}

// ===== SQL-backed store =====

/// History kept in the `migrations` table, through any [`SqlClient`].
#[derive(Debug, Clone)]
pub struct SqlHistoryStore<C> {
    client: C,
}

impl<C: SqlClient> SqlHistoryStore<C> {
    /// Creates a store on `client`. History writes never go through a
    /// migration's transaction.
    pub const fn new(client: C) -> Self {
        Self { client }
    }

    /// The underlying client.
    pub const fn client(&self) -> &C {
        &self.client
    }

    async fn update_one(&self, name: &str, query: Query) -> Result<()> {
        let rows = self.client.execute_any(&query.compile()).await?;
        if rows.is_empty() {
            return Err(MigrateError::MigrationNotFound(name.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl<C: SqlClient> HistoryStore for SqlHistoryStore<C> {
    async fn ensure_table(&self) -> Result<()> {
        self.client
            .execute_none(&Query::new().raw(CREATE_MIGRATIONS_TABLE_SQL).compile())
            .await?;
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<HistoryEntry>> {
        let query = Query::new().raw(
            r#"SELECT "name", "started", "finished", "succeeded" FROM "migrations" ORDER BY "name""#,
        );
        let rows = self.client.execute_any(&query.compile()).await?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(HistoryEntry {
                name: row.text("name")?.to_string(),
                started: row.timestamp("started")?,
                finished: row.bool("finished")?,
                succeeded: row.bool("succeeded")?,
            });
        }
        Ok(entries)
    }

    async fn record_started(&self, name: &str, started: DateTime<Utc>) -> Result<()> {
        let query = Query::new()
            .raw(r#"INSERT INTO "migrations" ("name", "started", "finished", "succeeded") VALUES ("#)
            .param(name)
            .raw(",")
            .param(started)
            .raw(", FALSE, FALSE)");
        self.client.execute_none(&query.compile()).await?;
        Ok(())
    }

    async fn record_finished(&self, name: &str, succeeded: bool) -> Result<()> {
        let query = Query::new()
            .raw(r#"UPDATE "migrations" SET "finished" = TRUE, "succeeded" ="#)
            .param(succeeded)
            .raw(r#"WHERE "name" ="#)
            .param(name)
            .raw(r#"RETURNING "name""#);
        self.update_one(name, query).await
    }

    async fn mark_succeeded(&self, name: &str) -> Result<()> {
        let query = Query::new()
            .raw(r#"UPDATE "migrations" SET "finished" = TRUE, "succeeded" = TRUE WHERE "name" ="#)
            .param(name)
            .raw(r#"RETURNING "name""#);
        self.update_one(name, query).await
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let query = Query::new()
            .raw(r#"DELETE FROM "migrations" WHERE "name" ="#)
            .param(name)
            .raw(r#"RETURNING "name""#);
        self.update_one(name, query).await
    }
}

// ===== In-memory store =====

/// History kept in memory. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    entries: Arc<Mutex<BTreeMap<String, HistoryEntry>>>,
}

impl MemoryHistoryStore {
    /// An empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A history seeded with `entries`.
    #[must_use]
    pub fn with_entries(entries: impl IntoIterator<Item = HistoryEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| (entry.name.clone(), entry))
            .collect();
        Self {
            entries: Arc::new(Mutex::new(entries)),
        }
    }

    /// Current entries, ordered by name.
    #[must_use]
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.lock().values().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, HistoryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, name: &str, apply: impl FnOnce(&mut HistoryEntry)) -> Result<()> {
        let mut entries = self.lock();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| MigrateError::MigrationNotFound(name.to_string()))?;
        apply(entry);
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn ensure_table(&self) -> Result<()> {
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self.snapshot())
    }

    async fn record_started(&self, name: &str, started: DateTime<Utc>) -> Result<()> {
        let mut entries = self.lock();
        if entries.contains_key(name) {
            return Err(MigrateError::InvalidState(format!(
                "history entry for '{name}' already exists"
            )));
        }
        entries.insert(name.to_string(), HistoryEntry::started(name, started));
        Ok(())
    }

    async fn record_finished(&self, name: &str, succeeded: bool) -> Result<()> {
        self.update(name, |entry| {
            entry.finished = true;
            entry.succeeded = succeeded;
        })
    }

    async fn mark_succeeded(&self, name: &str) -> Result<()> {
        self.update(name, |entry| {
            entry.finished = true;
            entry.succeeded = true;
        })
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| MigrateError::MigrationNotFound(name.to_string()))
    }
}
