//! The declared schema model.
//!
//! A [`Schema`] is assembled once at startup from [`TableSpec`]s and handed
//! explicitly to everything that needs it: the DDL builders, the diff and the
//! hash. Nothing here is global or mutable after construction.
//!
//! # Example
//!
//! ```rust
//! use schemagate_core::schema::{FieldSpec, FieldType, Schema, TableSpec};
//!
//! let widgets = TableSpec::builder("Widgets")
//!     .field(FieldSpec::new("color", FieldType::text()))
//!     .build()
//!     .unwrap();
//! let schema = Schema::builder().table(widgets).build().unwrap();
//! assert!(schema.table("Widgets").is_ok());
//! ```

mod field;
mod index;
mod table;

use std::collections::{BTreeSet, HashSet};

pub use field::{FieldSpec, FieldType, Literal, ScalarKind, ID_LENGTH};
pub use index::{Comparison, IndexCondition, IndexMethod, IndexSpec};
pub use table::{TableSpec, TableSpecBuilder};

use crate::error::{SchemaError, SchemaReferenceError};

/// Every table the application declares.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    tables: Vec<TableSpec>,
}

impl Schema {
    /// Starts assembling a schema.
    #[must_use]
    pub const fn builder() -> SchemaBuilder {
        SchemaBuilder { tables: Vec::new() }
    }

    /// Assembles a schema from already-built tables.
    ///
    /// # Errors
    ///
    /// Fails when two tables share a name or a foreign key targets a table
    /// that is not part of the schema.
    pub fn new(tables: Vec<TableSpec>) -> Result<Self, SchemaError> {
        let mut names = HashSet::new();
        for table in &tables {
            if !names.insert(table.name()) {
                return Err(SchemaError::DuplicateTable(table.name().to_string()));
            }
        }
        for table in &tables {
            for field in table.fields() {
                if let Some(target) = foreign_key_target(field.field_type()) {
                    if !names.contains(target) {
                        return Err(SchemaReferenceError::Table {
                            table: target.to_string(),
                        }
                        .into());
                    }
                }
            }
        }
        Ok(Self { tables })
    }

    /// Tables in declaration order.
    #[must_use]
    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    /// Looks up a table by name.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaReferenceError::Table`] when no such table is declared.
    pub fn table(&self, name: &str) -> Result<&TableSpec, SchemaReferenceError> {
        self.tables
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| SchemaReferenceError::Table {
                table: name.to_string(),
            })
    }

    /// Extensions the declared column types depend on, sorted.
    #[must_use]
    pub fn required_extensions(&self) -> BTreeSet<&'static str> {
        self.tables
            .iter()
            .flat_map(TableSpec::fields)
            .filter_map(|f| f.field_type().required_extension())
            .collect()
    }
}

fn foreign_key_target(field_type: &FieldType) -> Option<&str> {
    match field_type {
        FieldType::ForeignKey(target) => Some(target),
        FieldType::Array(inner) => foreign_key_target(inner),
        _ => None,
    }
}

/// Builder for [`Schema`].
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    tables: Vec<TableSpec>,
}

impl SchemaBuilder {
    /// Adds a table.
    #[must_use]
    pub fn table(mut self, table: TableSpec) -> Self {
        self.tables.push(table);
        self
    }

    /// Validates and assembles the schema.
    ///
    /// # Errors
    ///
    /// See [`Schema::new`].
    pub fn build(self) -> Result<Schema, SchemaError> {
        Schema::new(self.tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableSpec {
        TableSpec::builder("Users")
            .field(FieldSpec::new("_id", FieldType::id()).not_null())
            .primary_key("_id")
            .build()
            .unwrap()
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let err = Schema::builder()
            .table(users())
            .table(users())
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateTable("Users".into()));
    }

    #[test]
    fn test_foreign_key_target_must_exist() {
        let posts = TableSpec::builder("Posts")
            .field(FieldSpec::new("userId", FieldType::foreign_key("Users")))
            .build()
            .unwrap();
        let err = Schema::builder().table(posts.clone()).build().unwrap_err();
        assert!(err.to_string().contains("Table \"Users\""));

        let schema = Schema::builder().table(users()).table(posts).build();
        assert!(schema.is_ok());
    }

    #[test]
    fn test_required_extensions() {
        let embeddings = TableSpec::builder("PostEmbeddings")
            .field(FieldSpec::new("embeddings", FieldType::vector(1536)))
            .build()
            .unwrap();
        let schema = Schema::builder()
            .table(users())
            .table(embeddings)
            .build()
            .unwrap();
        assert_eq!(
            schema.required_extensions().into_iter().collect::<Vec<_>>(),
            ["vector"]
        );
    }
}
