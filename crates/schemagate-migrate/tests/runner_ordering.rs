//! Ordering, idempotence and failure handling of the migration runner.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use schemagate_core::Schema;
use schemagate_migrate::client::RecordingClient;
use schemagate_migrate::history::{HistoryEntry, MemoryHistoryStore, MigrationState};
use schemagate_migrate::migration::{MigrationSet, StaticMigration};
use schemagate_migrate::runner::{MigrationRunner, Resolution};
use schemagate_migrate::MigrateError;

const M1: StaticMigration = StaticMigration {
    name: "20260101T000000.create_a",
    accepts_schema_hash: None,
    up: &[r#"CREATE TABLE IF NOT EXISTS "A" ("x" TEXT)"#],
    down: Some(&[r#"DROP TABLE IF EXISTS "A""#]),
};

const M2: StaticMigration = StaticMigration {
    name: "20260102T000000.create_b",
    accepts_schema_hash: None,
    up: &[r#"CREATE TABLE IF NOT EXISTS "B" ("x" TEXT)"#],
    down: Some(&[r#"DROP TABLE IF EXISTS "B""#]),
};

const M3: StaticMigration = StaticMigration {
    name: "20260103T000000.create_c",
    accepts_schema_hash: None,
    up: &[
        r#"CREATE TABLE IF NOT EXISTS "C" ("x" TEXT)"#,
        r#"CREATE INDEX IF NOT EXISTS "idx_C_x" ON "C" USING btree ("x")"#,
    ],
    down: None,
};

fn runner(
    client: &RecordingClient,
    history: &MemoryHistoryStore,
) -> MigrationRunner<RecordingClient, MemoryHistoryStore> {
    MigrationRunner::new(
        client.clone(),
        history.clone(),
        Arc::new(Schema::default()),
        // Declared out of order on purpose; the set sorts by name.
        MigrationSet::from_static(&[M3, M1, M2]).unwrap(),
    )
}

fn succeeded(name: &str) -> HistoryEntry {
    let mut entry = HistoryEntry::started(name, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    entry.finished = true;
    entry.succeeded = true;
    entry
}

fn states(history: &MemoryHistoryStore) -> Vec<(String, MigrationState)> {
    history
        .snapshot()
        .into_iter()
        .map(|e| (e.name.clone(), e.state()))
        .collect()
}

#[tokio::test]
async fn test_migrate_applies_in_name_order() {
    let client = RecordingClient::new();
    let history = MemoryHistoryStore::new();
    let runner = runner(&client, &history);

    let applied = runner.migrate().await.unwrap();
    assert_eq!(applied, [M1.name, M2.name, M3.name]);
    assert_eq!(client.commits(), 3);
    assert_eq!(
        client.statements(),
        [M1.up[0], M2.up[0], M3.up[0], M3.up[1]]
    );
    assert!(states(&history)
        .iter()
        .all(|(_, state)| *state == MigrationState::Applied));
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let client = RecordingClient::new();
    let history = MemoryHistoryStore::new();
    let runner = runner(&client, &history);

    runner.migrate().await.unwrap();
    let before = history.snapshot();
    client.clear();

    assert!(runner.migrate().await.unwrap().is_empty());
    assert!(client.statements().is_empty());
    assert_eq!(client.commits(), 0);
    assert_eq!(history.snapshot(), before);
}

#[tokio::test]
async fn test_gap_in_history_stops_everything() {
    let client = RecordingClient::new();
    let history = MemoryHistoryStore::with_entries([succeeded(M1.name), succeeded(M3.name)]);
    let runner = runner(&client, &history);

    let err = runner.migrate().await.unwrap_err();
    match err {
        MigrateError::OutOfOrderMigration { migration, pending } => {
            assert_eq!(migration, M3.name);
            assert_eq!(pending, M2.name);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(client.statements().is_empty());
    assert_eq!(history.snapshot().len(), 2);
}

#[tokio::test]
async fn test_apply_refuses_to_skip_ahead() {
    let client = RecordingClient::new();
    let history = MemoryHistoryStore::with_entries([succeeded(M1.name)]);
    let runner = runner(&client, &history);

    let err = runner.apply(M3.name).await.unwrap_err();
    assert!(matches!(
        err,
        MigrateError::OutOfOrderMigration { ref pending, .. } if pending == M2.name
    ));
    assert!(client.statements().is_empty());

    assert!(runner.apply(M2.name).await.unwrap());
    assert!(runner.apply(M3.name).await.unwrap());
    assert!(!runner.apply(M3.name).await.unwrap());
}

#[tokio::test]
async fn test_failure_stops_the_run_and_rolls_back() {
    let client = RecordingClient::new().fail_on(r#"CREATE INDEX IF NOT EXISTS "idx_C_x""#);
    let history = MemoryHistoryStore::new();
    let runner = runner(&client, &history);

    let err = runner.migrate().await.unwrap_err();
    match &err {
        MigrateError::MigrationExecution { name, .. } => assert_eq!(name, M3.name),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("simulated failure"));

    // The CREATE TABLE of the failed migration was rolled back with it.
    assert_eq!(client.statements(), [M1.up[0], M2.up[0]]);
    assert_eq!(client.rollbacks(), 1);
    assert_eq!(
        states(&history),
        [
            (M1.name.to_string(), MigrationState::Applied),
            (M2.name.to_string(), MigrationState::Applied),
            (M3.name.to_string(), MigrationState::Failed),
        ]
    );
}

#[tokio::test]
async fn test_failed_migration_blocks_until_resolved() {
    let client = RecordingClient::new().fail_on(r#"CREATE TABLE IF NOT EXISTS "B""#);
    let history = MemoryHistoryStore::new();
    let runner = runner(&client, &history);

    runner.migrate().await.unwrap_err();
    let err = runner.migrate().await.unwrap_err();
    assert!(matches!(
        err,
        MigrateError::UnresolvedMigration { ref name, state: MigrationState::Failed } if name == M2.name
    ));

    runner.resolve(M2.name, Resolution::MarkSucceeded).await.unwrap();
    assert_eq!(runner.migrate().await.unwrap(), [M3.name]);
}

#[tokio::test]
async fn test_incomplete_migration_blocks_until_retried() {
    let client = RecordingClient::new();
    let history = MemoryHistoryStore::with_entries([
        succeeded(M1.name),
        HistoryEntry::started(M2.name, Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap()),
    ]);
    let runner = runner(&client, &history);

    let err = runner.migrate().await.unwrap_err();
    assert!(matches!(
        err,
        MigrateError::UnresolvedMigration { state: MigrationState::Incomplete, .. }
    ));

    runner.resolve(M2.name, Resolution::Retry).await.unwrap();
    assert_eq!(runner.migrate().await.unwrap(), [M2.name, M3.name]);
    assert_eq!(client.statements()[0], M2.up[0]);
}

#[tokio::test]
async fn test_rollback_and_resolve_guards() {
    let client = RecordingClient::new();
    let history = MemoryHistoryStore::new();
    let runner = runner(&client, &history);
    runner.migrate().await.unwrap();

    let err = runner.rollback(M3.name).await.unwrap_err();
    assert!(matches!(err, MigrateError::NotReversible(_)));

    let err = runner.rollback(M1.name).await.unwrap_err();
    assert!(matches!(err, MigrateError::InvalidState(_)));

    client.clear();
    runner.resolve(M3.name, Resolution::Retry).await.unwrap_err();
    assert!(client.statements().is_empty());
}
