//! Generate a migration for a new table against an empty database, write
//! it, run it and check the gate.

use std::fs;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use schemagate_core::live::LiveSchema;
use schemagate_core::schema::{FieldSpec, FieldType, TableSpec};
use schemagate_core::Schema;
use schemagate_migrate::client::RecordingClient;
use schemagate_migrate::gate::AcceptanceGate;
use schemagate_migrate::generator::DiffGenerator;
use schemagate_migrate::history::{MemoryHistoryStore, MigrationState};
use schemagate_migrate::migration::{Migration, MigrationSet};
use schemagate_migrate::runner::MigrationRunner;
use schemagate_migrate::writer::MigrationWriter;

fn widgets() -> Schema {
    Schema::builder()
        .table(
            TableSpec::builder("Widgets")
                .field(FieldSpec::new("color", FieldType::text()))
                .build()
                .unwrap(),
        )
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_new_table_end_to_end() {
    let schema = widgets();
    let now = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();

    let migration = DiffGenerator::new(&schema)
        .generate(&LiveSchema::new(), "add widgets", now)
        .unwrap()
        .expect("a new table is a change");
    assert_eq!(migration.up.len(), 1);
    assert!(migration.up[0]
        .sql
        .contains(r#"CREATE TABLE IF NOT EXISTS "Widgets""#));

    let dir = tempfile::tempdir().unwrap();
    let path = MigrationWriter::new(&migration)
        .write_to(dir.path())
        .unwrap();
    let source = fs::read_to_string(path).unwrap();
    assert!(source.contains(r#"Create table "Widgets""#));
    assert!(source.contains(&migration.accepts_schema_hash));

    let name = migration.name.clone();
    let migrations = MigrationSet::new(vec![Box::new(migration) as Box<dyn Migration>]).unwrap();
    AcceptanceGate::new(&schema, &migrations, dir.path())
        .check()
        .unwrap();

    let client = RecordingClient::new();
    let history = MemoryHistoryStore::new();
    let runner = MigrationRunner::new(client.clone(), history.clone(), Arc::new(schema), migrations);
    assert_eq!(runner.migrate().await.unwrap(), [name.as_str()]);

    let entries = history.snapshot();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, name);
    assert_eq!(entries[0].state(), MigrationState::Applied);
    assert_eq!(
        client.statements(),
        [r#"CREATE TABLE IF NOT EXISTS "Widgets" ("color" TEXT)"#]
    );

    // The database now matches; nothing more to generate.
    let live = LiveSchema::from_schema(runner.schema());
    assert!(DiffGenerator::new(runner.schema())
        .generate(&live, "again", now)
        .unwrap()
        .is_none());
}
