//! Turns a schema diff into a new migration.

use chrono::{DateTime, Utc};
use schemagate_core::diff::{DiffOptions, SchemaDiff};
use schemagate_core::live::LiveSchema;
use schemagate_core::{Schema, SchemaHash};
use tracing::info;

use crate::error::Result;
use crate::history::HISTORY_TABLE;
use crate::migration::GeneratedMigration;

/// Timestamp prefix of generated migration names.
pub const NAME_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Builds a sortable migration name: `<YYYYMMDDTHHMMSS>.<slug>`.
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use schemagate_migrate::generator::migration_name;
///
/// let now = Utc.with_ymd_and_hms(2026, 10, 18, 12, 30, 0).unwrap();
/// assert_eq!(migration_name(now, "Add widgets!"), "20261018T123000.add_widgets");
/// ```
#[must_use]
pub fn migration_name(now: DateTime<Utc>, description: &str) -> String {
    format!("{}.{}", now.format(NAME_TIMESTAMP_FORMAT), slug(description))
}

fn slug(description: &str) -> String {
    let mut slug = String::with_capacity(description.len());
    for ch in description.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_end_matches('_');
    if slug.is_empty() {
        "auto".to_string()
    } else {
        slug.to_string()
    }
}

/// Diffs the declared schema against a live snapshot.
#[derive(Debug, Clone)]
pub struct DiffGenerator<'a> {
    schema: &'a Schema,
    options: DiffOptions,
}

impl<'a> DiffGenerator<'a> {
    /// A generator that never drops the history table.
    #[must_use]
    pub fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            options: DiffOptions::default().ignore_table(HISTORY_TABLE),
        }
    }

    /// Leaves another live table alone.
    #[must_use]
    pub fn ignore_table(mut self, table: impl Into<String>) -> Self {
        self.options = self.options.ignore_table(table);
        self
    }

    /// The raw diff.
    ///
    /// # Errors
    ///
    /// Fails if the snapshot holds names that are not valid identifiers.
    pub fn diff(&self, live: &LiveSchema) -> Result<SchemaDiff> {
        Ok(SchemaDiff::compute(self.schema, live, &self.options)?)
    }

    /// A migration converging `live` to the schema, or `None` if they match.
    ///
    /// The migration accepts the schema's current hash.
    ///
    /// # Errors
    ///
    /// See [`diff`](Self::diff).
    pub fn generate(
        &self,
        live: &LiveSchema,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<GeneratedMigration>> {
        let diff = self.diff(live)?;
        if diff.is_empty() {
            info!("Database matches the schema; nothing to generate");
            return Ok(None);
        }

        let migration = GeneratedMigration {
            name: migration_name(now, description),
            accepts_schema_hash: SchemaHash::compute(self.schema).to_string(),
            changes: diff.changes.iter().map(|c| c.description.clone()).collect(),
            irreversible: diff
                .irreversible()
                .into_iter()
                .map(|c| c.description.clone())
                .collect(),
            up: diff.up().map(|q| q.compile()).collect(),
            down: diff
                .down()
                .map(|queries| queries.into_iter().map(|q| q.compile()).collect()),
        };
        info!(
            migration = %migration.name,
            changes = migration.changes.len(),
            "Generated migration"
        );
        Ok(Some(migration))
    }
}
