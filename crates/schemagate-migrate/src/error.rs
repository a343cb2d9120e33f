//! Error types for the migration system.

use std::path::PathBuf;

use schemagate_core::{SchemaError, SchemaReferenceError};

use crate::client::ClientError;
use crate::history::MigrationState;

/// Errors that can occur during migration operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// A migration body referenced a table, field or index the schema lacks.
    #[error(transparent)]
    SchemaReference(#[from] SchemaReferenceError),

    /// The schema or a live snapshot could not be turned into DDL.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A migration sorts after one that has not been applied, but has been
    /// (or is about to be) applied itself.
    #[error(
        "Migration '{migration}' sorts after '{pending}', which has not been applied; \
         migrations must be applied in order"
    )]
    OutOfOrderMigration {
        /// The later migration.
        migration: String,
        /// The earlier migration that is still pending.
        pending: String,
    },

    /// A migration has a failed or incomplete history entry.
    #[error(
        "Migration '{name}' is {state} in the history table; resolve it before running migrations"
    )]
    UnresolvedMigration {
        /// The migration name.
        name: String,
        /// `failed` or `incomplete`.
        state: MigrationState,
    },

    /// A migration body failed.
    #[error("Migration '{name}' failed: {source}")]
    MigrationExecution {
        /// The migration name.
        name: String,
        /// What the body raised.
        #[source]
        source: Box<MigrateError>,
    },

    /// The declared schema no longer hashes to what the migrations accept.
    #[error(
        "Schema hash mismatch: the schema hashes to {actual} but {} accepts {}; see {}",
        .migration.as_deref().map_or_else(|| "no migration".to_string(), |m| format!("migration '{m}'")),
        .expected.as_deref().unwrap_or("nothing"),
        .artifact.display()
    )]
    SchemaHashMismatch {
        /// Hash declared by the most recent migration that declares one.
        expected: Option<String>,
        /// Hash of the schema in code.
        actual: String,
        /// The migration declaring `expected`.
        migration: Option<String>,
        /// The pending-diff artifact that was written.
        artifact: PathBuf,
    },

    /// The SQL client failed.
    #[error(transparent)]
    Database(#[from] ClientError),

    /// Two migrations share a name.
    #[error("Duplicate migration name '{0}'")]
    DuplicateMigration(String),

    /// No migration or history entry has this name.
    #[error("Migration not found: {0}")]
    MigrationNotFound(String),

    /// A migration has no `down` procedure.
    #[error("Migration '{0}' is not reversible")]
    NotReversible(String),

    /// A history operation does not apply to the entry's current state.
    #[error("Invalid migration state: {0}")]
    InvalidState(String),

    /// Generated migration file already exists.
    #[error("Migration file already exists: {0}")]
    MigrationExists(PathBuf),

    /// IO error (reading/writing schema snapshots and migration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MigrateError {
    /// `true` if the database could not be reached at all.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Database(ClientError::Connection(_)))
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
