//! The offline schema-hash gate, driven through the command line.

use std::fs;
use std::path::Path;

use clap::Parser;
use schemagate_core::schema::{FieldSpec, FieldType, TableSpec};
use schemagate_core::{Schema, SchemaHash};
use schemagate_migrate::cli::Cli;
use schemagate_migrate::gate::{ACCEPTED_SCHEMA_FILE, PENDING_DIFF_FILE};
use schemagate_migrate::migration::{GeneratedMigration, Migration, MigrationSet};
use schemagate_migrate::MigrateError;

fn widgets(fields: &[&str]) -> Schema {
    let table = fields
        .iter()
        .fold(TableSpec::builder("Widgets"), |builder, &field| {
            builder.field(FieldSpec::new(field, FieldType::text()))
        })
        .build()
        .unwrap();
    Schema::builder().table(table).build().unwrap()
}

fn accepting(name: &str, schema: &Schema) -> Box<dyn Migration> {
    Box::new(GeneratedMigration {
        name: name.to_string(),
        accepts_schema_hash: SchemaHash::compute(schema).to_string(),
        changes: Vec::new(),
        irreversible: Vec::new(),
        up: Vec::new(),
        down: None,
    })
}

fn cli(dir: &Path, command: &str) -> Cli {
    let mut cli = Cli::try_parse_from([
        "schemagate",
        "--schema-dir",
        dir.to_str().unwrap(),
        command,
    ])
    .unwrap();
    cli.database_url = None;
    cli
}

#[tokio::test]
async fn test_check_passes_when_latest_migration_accepts_schema() {
    let dir = tempfile::tempdir().unwrap();
    let schema = widgets(&["color"]);
    let migrations = MigrationSet::new(vec![accepting("20260101T000000.widgets", &schema)]).unwrap();

    cli(dir.path(), "check")
        .execute(schema, migrations)
        .await
        .unwrap();
    assert!(!dir.path().join(PENDING_DIFF_FILE).exists());
}

#[tokio::test]
async fn test_check_fails_on_unaccepted_change() {
    let dir = tempfile::tempdir().unwrap();
    let before = widgets(&["color"]);
    let after = widgets(&["color", "weight"]);

    cli(dir.path(), "accept")
        .execute(
            before.clone(),
            MigrationSet::new(vec![accepting("20260101T000000.widgets", &before)]).unwrap(),
        )
        .await
        .unwrap();
    assert!(dir.path().join(ACCEPTED_SCHEMA_FILE).exists());

    let err = cli(dir.path(), "check")
        .execute(
            after.clone(),
            MigrationSet::new(vec![accepting("20260101T000000.widgets", &before)]).unwrap(),
        )
        .await
        .unwrap_err();
    match err.downcast_ref::<MigrateError>() {
        Some(MigrateError::SchemaHashMismatch {
            expected,
            actual,
            migration,
            ..
        }) => {
            assert_eq!(
                expected.as_deref(),
                Some(SchemaHash::compute(&before).as_str())
            );
            assert_eq!(actual, SchemaHash::compute(&after).as_str());
            assert_eq!(migration.as_deref(), Some("20260101T000000.widgets"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let artifact = fs::read_to_string(dir.path().join(PENDING_DIFF_FILE)).unwrap();
    assert!(!artifact.is_empty());
    assert!(artifact.contains(r#"+  field "weight" TEXT nullable no_default"#));

    // A newer migration accepting the new hash clears the gate and the artifact.
    cli(dir.path(), "check")
        .execute(
            after.clone(),
            MigrationSet::new(vec![
                accepting("20260101T000000.widgets", &before),
                accepting("20260102T000000.weight", &after),
            ])
            .unwrap(),
        )
        .await
        .unwrap();
    assert!(!dir.path().join(PENDING_DIFF_FILE).exists());
}

#[tokio::test]
async fn test_reordering_fields_does_not_trip_the_gate() {
    let dir = tempfile::tempdir().unwrap();
    let accepted = widgets(&["color", "weight"]);
    let reordered = widgets(&["weight", "color"]);

    cli(dir.path(), "check")
        .execute(
            reordered,
            MigrationSet::new(vec![accepting("20260101T000000.widgets", &accepted)]).unwrap(),
        )
        .await
        .unwrap();
}
