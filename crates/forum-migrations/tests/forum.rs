use std::path::Path;
use std::sync::Arc;

use forum_migrations::{migrations, schema};
use schemagate_core::hash::canonical_text;
use schemagate_migrate::client::RecordingClient;
use schemagate_migrate::gate::{self, AcceptanceGate};
use schemagate_migrate::history::MemoryHistoryStore;
use schemagate_migrate::runner::{self, Direction, MigrationRunner};

#[test]
fn test_committed_snapshot_matches_schema() {
    let schema = schema::forum().unwrap();
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("schema");
    let snapshot = gate::read_snapshot(&dir).unwrap().unwrap();
    assert_eq!(snapshot, canonical_text(&schema));
}

#[test]
fn test_latest_migration_accepts_schema() {
    let schema = schema::forum().unwrap();
    let migrations = migrations::all().unwrap();
    let dir = tempfile::tempdir().unwrap();
    AcceptanceGate::new(&schema, &migrations, dir.path())
        .check()
        .unwrap();
}

#[tokio::test]
async fn test_fresh_database_runs_every_migration() {
    let client = RecordingClient::new();
    let history = MemoryHistoryStore::new();
    let runner = MigrationRunner::new(
        client.clone(),
        history.clone(),
        Arc::new(schema::forum().unwrap()),
        migrations::all().unwrap(),
    );

    let applied = runner.migrate().await.unwrap();
    assert_eq!(
        applied,
        [
            "20260101T000000.create_users_and_posts",
            "20260215T093000.add_comments",
            "20261018T120000.add_user_email",
        ]
    );

    let statements = client.statements();
    assert_eq!(statements.len(), 7);
    assert!(statements[0]
        .starts_with(r#"CREATE TABLE IF NOT EXISTS "Users" ("_id" VARCHAR(27) PRIMARY KEY"#));
    assert_eq!(
        statements[1],
        r#"CREATE UNIQUE INDEX IF NOT EXISTS "idx_Users_username" ON "Users" USING btree ("username")"#
    );
    assert!(statements[4].starts_with(r#"CREATE TABLE IF NOT EXISTS "Comments""#));
    assert_eq!(
        statements[6],
        r#"ALTER TABLE "Users" ADD COLUMN IF NOT EXISTS "email" TEXT"#
    );
    assert_eq!(client.commits(), 3);
    assert_eq!(history.snapshot().len(), 3);

    assert!(runner.migrate().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rollback_sql_of_hand_written_migration() {
    let schema = schema::forum().unwrap();
    let migrations = migrations::all().unwrap();
    let migration = migrations
        .require("20260101T000000.create_users_and_posts")
        .unwrap();

    let down = runner::preview(migration, &schema, Direction::Down)
        .await
        .unwrap();
    let sql: Vec<&str> = down.iter().map(|q| q.sql.as_str()).collect();
    assert_eq!(
        sql,
        [
            r#"DROP TABLE IF EXISTS "Posts""#,
            r#"DROP TABLE IF EXISTS "Users""#
        ]
    );
}
