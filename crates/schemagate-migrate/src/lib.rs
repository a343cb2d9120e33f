//! # schemagate-migrate
//!
//! Runs [`schemagate_core`] DDL against Postgres: ordered, transactional
//! migrations with a history table, an offline schema-hash gate, and a
//! generator that diffs the declared schema against a live database.
//!
//! ## Features
//!
//! - **Strict ordering**: migrations sort by name and must be applied in
//!   that order; gaps are reported, never skipped
//! - **One transaction per migration**: a failure rolls back its statements
//!   and stops the run
//! - **Explicit recovery**: failed or incomplete attempts block further runs
//!   until resolved
//! - **Acceptance gate**: CI fails when the schema changes without a
//!   migration accepting its new hash
//! - **Generation**: introspect, diff and write a frozen migration file
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use schemagate_core::schema::{FieldSpec, FieldType, TableSpec};
//! use schemagate_core::Schema;
//! use schemagate_migrate::client::RecordingClient;
//! use schemagate_migrate::history::MemoryHistoryStore;
//! use schemagate_migrate::migration::{MigrationSet, StaticMigration};
//! use schemagate_migrate::runner::MigrationRunner;
//!
//! const CREATE_WIDGETS: StaticMigration = StaticMigration {
//!     name: "20261018T120000.create_widgets",
//!     accepts_schema_hash: None,
//!     up: &[r#"CREATE TABLE IF NOT EXISTS "Widgets" ("color" TEXT)"#],
//!     down: Some(&[r#"DROP TABLE IF EXISTS "Widgets""#]),
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> schemagate_migrate::Result<()> {
//! let schema = Schema::builder()
//!     .table(
//!         TableSpec::builder("Widgets")
//!             .field(FieldSpec::new("color", FieldType::text()))
//!             .build()?,
//!     )
//!     .build()?;
//!
//! let runner = MigrationRunner::new(
//!     RecordingClient::new(),
//!     MemoryHistoryStore::new(),
//!     Arc::new(schema),
//!     MigrationSet::from_static(&[CREATE_WIDGETS])?,
//! );
//! assert_eq!(runner.migrate().await?, ["20261018T120000.create_widgets"]);
//! assert!(runner.migrate().await?.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod client;
pub mod error;
pub mod gate;
pub mod generator;
pub mod history;
pub mod introspect;
pub mod migration;
pub mod runner;
pub mod writer;

pub use error::{MigrateError, Result};
pub use gate::AcceptanceGate;
pub use history::{HistoryEntry, HistoryStore, MigrationState};
pub use migration::{Migration, MigrationContext, MigrationSet, StaticMigration};
pub use runner::MigrationRunner;
