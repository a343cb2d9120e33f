//! Migrations and the context their bodies run in.
//!
//! A migration is anything implementing [`Migration`]. Hand-written ones
//! usually implement the trait directly and use the [`MigrationContext`]
//! helpers; generated ones are [`StaticMigration`] constants holding frozen
//! SQL.
//!
//! ```rust
//! use async_trait::async_trait;
//! use schemagate_migrate::migration::{Migration, MigrationContext};
//! use schemagate_migrate::Result;
//!
//! pub struct AddPostTitle;
//!
//! #[async_trait]
//! impl Migration for AddPostTitle {
//!     fn name(&self) -> &str {
//!         "20260101T000000.add_post_title"
//!     }
//!
//!     fn is_reversible(&self) -> bool {
//!         true
//!     }
//!
//!     async fn up(&self, ctx: &MigrationContext<'_>) -> Result<()> {
//!         ctx.add_field("Posts", "title").await
//!     }
//!
//!     async fn down(&self, ctx: &MigrationContext<'_>) -> Result<()> {
//!         ctx.drop_field("Posts", "title").await
//!     }
//! }
//! ```

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use schemagate_core::ddl::{
    AddField, CreateExtension, CreateIndex, CreateTable, DropField, DropTable, Statement,
    UpdateFieldType,
};
use schemagate_core::schema::TableSpec;
use schemagate_core::{CompiledQuery, Query, Schema};

use crate::client::SqlClient;
use crate::error::{MigrateError, Result};

/// A named, ordered unit of schema change.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Sortable name, e.g. `20260101T000000.add_post_title`.
    fn name(&self) -> &str;

    /// The schema hash this migration was authored against, if it declares one.
    fn accepts_schema_hash(&self) -> Option<&str> {
        None
    }

    /// Whether [`down`](Migration::down) undoes [`up`](Migration::up).
    ///
    /// Defaults to `false`. Rollback refuses a migration that returns
    /// `false`, so override this together with `down`.
    fn is_reversible(&self) -> bool {
        false
    }

    /// Applies the change.
    async fn up(&self, ctx: &MigrationContext<'_>) -> Result<()>;

    /// Reverts the change. Only used by local rollback tooling, and only
    /// when [`is_reversible`](Migration::is_reversible) says so.
    async fn down(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let _ = ctx;
        Ok(())
    }
}

impl fmt::Debug for dyn Migration + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("name", &self.name())
            .field("accepts_schema_hash", &self.accepts_schema_hash())
            .finish()
    }
}

// ===== Context =====

/// What a migration body can reach: a database handle and the schema.
///
/// During a run the handle is the migration's transaction.
#[derive(Clone, Copy)]
pub struct MigrationContext<'a> {
    db: &'a dyn SqlClient,
    schema: &'a Schema,
}

impl<'a> MigrationContext<'a> {
    /// Creates a context.
    #[must_use]
    pub const fn new(db: &'a dyn SqlClient, schema: &'a Schema) -> Self {
        Self { db, schema }
    }

    /// The database handle, for arbitrary parameterized statements.
    #[must_use]
    pub const fn db(&self) -> &'a dyn SqlClient {
        self.db
    }

    /// The declared schema.
    #[must_use]
    pub const fn schema(&self) -> &'a Schema {
        self.schema
    }

    /// Looks up a declared table.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::SchemaReference`] if the table is not declared.
    pub fn table(&self, name: &str) -> Result<&'a TableSpec> {
        Ok(self.schema.table(name)?)
    }

    /// Runs a DDL statement.
    ///
    /// # Errors
    ///
    /// Propagates the client's error.
    pub async fn execute<S: Statement + Sync>(&self, statement: &S) -> Result<()> {
        self.execute_compiled(&statement.compile()).await
    }

    /// Runs a query.
    ///
    /// # Errors
    ///
    /// Propagates the client's error.
    pub async fn execute_query(&self, query: &Query) -> Result<()> {
        self.execute_compiled(&query.compile()).await
    }

    /// Runs an already compiled statement.
    ///
    /// # Errors
    ///
    /// Propagates the client's error.
    pub async fn execute_compiled(&self, query: &CompiledQuery) -> Result<()> {
        self.db.execute_none(query).await?;
        Ok(())
    }

    /// Creates a declared table, without its indexes.
    ///
    /// # Errors
    ///
    /// Fails if the table is not declared or the statement fails.
    pub async fn create_table(&self, table: &str) -> Result<()> {
        let compiled = CreateTable::new(self.table(table)?).compile();
        self.execute_compiled(&compiled).await
    }

    /// Drops a declared table.
    ///
    /// # Errors
    ///
    /// Fails if the table is not declared or the statement fails.
    pub async fn drop_table(&self, table: &str) -> Result<()> {
        let compiled = DropTable::new(self.table(table)?).compile();
        self.execute_compiled(&compiled).await
    }

    /// Adds a declared field.
    ///
    /// # Errors
    ///
    /// Fails if the table or field is not declared or the statement fails.
    pub async fn add_field(&self, table: &str, field: &str) -> Result<()> {
        let compiled = AddField::new(self.table(table)?, field)?.compile();
        self.execute_compiled(&compiled).await
    }

    /// Drops a declared field.
    ///
    /// # Errors
    ///
    /// Fails if the table or field is not declared or the statement fails.
    pub async fn drop_field(&self, table: &str, field: &str) -> Result<()> {
        let compiled = DropField::new(self.table(table)?, field)?.compile();
        self.execute_compiled(&compiled).await
    }

    /// Changes a column to its declared type, without converting data.
    ///
    /// # Errors
    ///
    /// Fails if the table or field is not declared or the cast fails.
    pub async fn update_field_type(&self, table: &str, field: &str) -> Result<()> {
        let compiled = UpdateFieldType::new(self.table(table)?, field)?.compile();
        self.execute_compiled(&compiled).await
    }

    /// Creates every declared index of a table that does not exist yet.
    ///
    /// # Errors
    ///
    /// Fails if the table is not declared or a statement fails.
    pub async fn update_indexes(&self, table: &str) -> Result<()> {
        let spec = self.table(table)?;
        let statements = spec
            .indexes()
            .iter()
            .map(|index| CreateIndex::new(spec, index).map(|s| s.compile()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for compiled in &statements {
            self.execute_compiled(compiled).await?;
        }
        Ok(())
    }

    /// Installs an extension.
    ///
    /// # Errors
    ///
    /// Fails if the name is not a valid identifier or the statement fails.
    pub async fn create_extension(&self, name: &str) -> Result<()> {
        let compiled = CreateExtension::new(name)?.compile();
        self.execute_compiled(&compiled).await
    }
}

// ===== Frozen migrations =====

/// A migration made of fixed SQL statements, as written by the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticMigration {
    /// Sortable name.
    pub name: &'static str,
    /// Schema hash accepted when the migration was generated.
    pub accepts_schema_hash: Option<&'static str>,
    /// Forward statements, in order.
    pub up: &'static [&'static str],
    /// Reverse statements, in order, if the change can be undone.
    pub down: Option<&'static [&'static str]>,
}

#[async_trait]
impl Migration for StaticMigration {
    fn name(&self) -> &str {
        self.name
    }

    fn accepts_schema_hash(&self) -> Option<&str> {
        self.accepts_schema_hash
    }

    fn is_reversible(&self) -> bool {
        self.down.is_some()
    }

    async fn up(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        for &sql in self.up {
            ctx.execute_query(&Query::new().raw(sql)).await?;
        }
        Ok(())
    }

    async fn down(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let statements = self
            .down
            .ok_or_else(|| MigrateError::NotReversible(self.name.to_string()))?;
        for &sql in statements {
            ctx.execute_query(&Query::new().raw(sql)).await?;
        }
        Ok(())
    }
}

/// A migration computed by the diff generator, before it is written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedMigration {
    /// `<YYYYMMDDTHHMMSS>.<description>`.
    pub name: String,
    /// Hash of the schema the migration converges to.
    pub accepts_schema_hash: String,
    /// One description per change.
    pub changes: Vec<String>,
    /// Descriptions of changes that have no inverse.
    pub irreversible: Vec<String>,
    /// Forward statements.
    pub up: Vec<CompiledQuery>,
    /// Reverse statements, if every change can be undone.
    pub down: Option<Vec<CompiledQuery>>,
}

#[async_trait]
impl Migration for GeneratedMigration {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts_schema_hash(&self) -> Option<&str> {
        Some(&self.accepts_schema_hash)
    }

    fn is_reversible(&self) -> bool {
        self.down.is_some()
    }

    async fn up(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        for query in &self.up {
            ctx.execute_compiled(query).await?;
        }
        Ok(())
    }

    async fn down(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let statements = self
            .down
            .as_ref()
            .ok_or_else(|| MigrateError::NotReversible(self.name.clone()))?;
        for query in statements {
            ctx.execute_compiled(query).await?;
        }
        Ok(())
    }
}

// ===== The ordered set =====

/// All known migrations, sorted by name. Built once at startup.
#[derive(Debug, Default)]
pub struct MigrationSet {
    migrations: Vec<Box<dyn Migration>>,
}

impl MigrationSet {
    /// Sorts `migrations` by name.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::DuplicateMigration`] if two share a name.
    pub fn new(mut migrations: Vec<Box<dyn Migration>>) -> Result<Self> {
        migrations.sort_by(|a, b| a.name().cmp(b.name()));
        let mut seen = BTreeSet::new();
        for migration in &migrations {
            if !seen.insert(migration.name()) {
                return Err(MigrateError::DuplicateMigration(
                    migration.name().to_string(),
                ));
            }
        }
        Ok(Self { migrations })
    }

    /// A set of frozen migrations.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::DuplicateMigration`] if two share a name.
    pub fn from_static(migrations: &[StaticMigration]) -> Result<Self> {
        Self::new(
            migrations
                .iter()
                .map(|m| Box::new(*m) as Box<dyn Migration>)
                .collect(),
        )
    }

    /// Migrations in name order.
    pub fn iter(&self) -> impl Iterator<Item = &(dyn Migration + 'static)> {
        self.migrations.iter().map(AsRef::as_ref)
    }

    /// Looks up a migration by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn Migration> {
        self.iter().find(|m| m.name() == name)
    }

    /// Looks up a migration by name, failing with an error that names it.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::MigrationNotFound`].
    pub fn require(&self, name: &str) -> Result<&dyn Migration> {
        self.get(name)
            .ok_or_else(|| MigrateError::MigrationNotFound(name.to_string()))
    }

    /// Number of migrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// `true` if there are no migrations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// The most recently authored migration that declares a schema hash,
    /// with that hash.
    #[must_use]
    pub fn latest_accepted_hash(&self) -> Option<(&str, &str)> {
        self.migrations
            .iter()
            .rev()
            .find_map(|m| m.accepts_schema_hash().map(|hash| (m.name(), hash)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RecordingClient;
    use schemagate_core::schema::{FieldSpec, FieldType, IndexSpec};

    const FIRST: StaticMigration = StaticMigration {
        name: "001_first",
        accepts_schema_hash: Some("aaa"),
        up: &[r#"CREATE TABLE IF NOT EXISTS "A" ("x" TEXT)"#],
        down: Some(&[r#"DROP TABLE IF EXISTS "A""#]),
    };

    const SECOND: StaticMigration = StaticMigration {
        name: "002_second",
        accepts_schema_hash: None,
        up: &["SELECT 1", "SELECT 2"],
        down: None,
    };

    fn schema() -> Schema {
        Schema::builder()
            .table(
                TableSpec::builder("Posts")
                    .field(FieldSpec::new("_id", FieldType::id()).not_null())
                    .field(FieldSpec::new("title", FieldType::text()))
                    .field(FieldSpec::new("score", FieldType::integer()))
                    .index(IndexSpec::for_columns("Posts", ["title"]))
                    .index(IndexSpec::for_columns("Posts", ["score"]))
                    .primary_key("_id")
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_set_sorts_and_rejects_duplicates() {
        let set = MigrationSet::from_static(&[SECOND, FIRST]).unwrap();
        let names: Vec<&str> = set.iter().map(|m| m.name()).collect();
        assert_eq!(names, ["001_first", "002_second"]);
        assert_eq!(set.len(), 2);
        assert!(set.get("002_second").is_some());
        assert!(matches!(
            set.require("003_third"),
            Err(MigrateError::MigrationNotFound(_))
        ));

        let err = MigrationSet::from_static(&[FIRST, FIRST]).unwrap_err();
        assert!(matches!(err, MigrateError::DuplicateMigration(name) if name == "001_first"));
    }

    #[test]
    fn test_latest_accepted_hash_skips_undeclared() {
        let set = MigrationSet::from_static(&[FIRST, SECOND]).unwrap();
        assert_eq!(set.latest_accepted_hash(), Some(("001_first", "aaa")));
        assert_eq!(MigrationSet::default().latest_accepted_hash(), None);
    }

    #[tokio::test]
    async fn test_static_migration_runs_its_statements() {
        let client = RecordingClient::new();
        let schema = schema();
        let ctx = MigrationContext::new(&client, &schema);

        SECOND.up(&ctx).await.unwrap();
        assert_eq!(client.statements(), ["SELECT 1", "SELECT 2"]);

        assert!(!SECOND.is_reversible());
        let err = SECOND.down(&ctx).await.unwrap_err();
        assert!(matches!(err, MigrateError::NotReversible(name) if name == "002_second"));
    }

    #[tokio::test]
    async fn test_context_helpers() {
        let client = RecordingClient::new();
        let schema = schema();
        let ctx = MigrationContext::new(&client, &schema);

        ctx.create_table("Posts").await.unwrap();
        ctx.add_field("Posts", "title").await.unwrap();
        ctx.update_indexes("Posts").await.unwrap();
        ctx.create_extension("vector").await.unwrap();

        let statements = client.statements();
        assert_eq!(statements.len(), 5);
        assert!(statements[0].starts_with(r#"CREATE TABLE IF NOT EXISTS "Posts""#));
        assert_eq!(
            statements[1],
            r#"ALTER TABLE "Posts" ADD COLUMN IF NOT EXISTS "title" TEXT"#
        );
        assert!(statements[2].contains(r#""idx_Posts_title""#));
        assert!(statements[3].contains(r#""idx_Posts_score""#));
        assert_eq!(
            statements[4],
            r#"CREATE EXTENSION IF NOT EXISTS "vector" CASCADE"#
        );
    }

    #[tokio::test]
    async fn test_context_reports_missing_references_before_io() {
        let client = RecordingClient::new();
        let schema = schema();
        let ctx = MigrationContext::new(&client, &schema);

        let err = ctx.add_field("Posts", "body").await.unwrap_err();
        assert!(matches!(err, MigrateError::SchemaReference(_)));
        assert!(err.to_string().contains(r#"Field "body" does not exist"#));

        let err = ctx.drop_table("Comments").await.unwrap_err();
        assert!(err.to_string().contains("Comments"));
        assert!(client.statements().is_empty());
    }
}
