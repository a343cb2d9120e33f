//! Snapshot of a live database's tables, columns, indexes and extensions.
//!
//! Produced by introspection and consumed by [`SchemaDiff`](crate::diff::SchemaDiff).
//! Types are kept in Postgres' `format_type()` spelling, defaults and index
//! predicates in `pg_get_expr()` spelling.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use crate::ddl::{CreateIndex, Statement};
use crate::error::{SchemaError, SchemaReferenceError};
use crate::ident::Identifier;
use crate::literal;
use crate::schema::{FieldSpec, IndexSpec, Schema, TableSpec};

/// A column as the database reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    /// Column name.
    pub name: Identifier,
    /// Type as reported by `format_type()`.
    pub data_type: String,
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// Default expression, if any.
    pub default: Option<String>,
}

impl LiveColumn {
    /// Creates a column snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidIdentifier`] for an unusable name.
    pub fn new(
        name: &str,
        data_type: impl Into<String>,
        nullable: bool,
        default: Option<&str>,
    ) -> Result<Self, SchemaError> {
        Ok(Self {
            name: Identifier::new(name)?,
            data_type: data_type.into(),
            nullable,
            default: default.map(str::to_string),
        })
    }

    /// Whether the default expression denotes `declared`, a rendered literal.
    #[must_use]
    pub fn default_matches(&self, declared: Option<&str>) -> bool {
        match (self.default.as_deref(), declared) {
            (None, None) => true,
            (Some(live), Some(declared)) => literal::equivalent(live, declared),
            _ => false,
        }
    }
}

/// A non-primary-key index as the database reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveIndex {
    /// Index name.
    pub name: Identifier,
    /// `pg_get_indexdef()` output.
    pub definition: String,
    /// Whether the index is `UNIQUE`.
    pub unique: bool,
    /// Access method name, e.g. `btree`.
    pub method: String,
    /// Key columns, in order.
    pub columns: Vec<String>,
    /// Partial-index predicate.
    pub predicate: Option<String>,
}

impl LiveIndex {
    /// A non-unique btree index with no columns; fill in the rest with the
    /// builder methods.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidIdentifier`] for an unusable name.
    pub fn new(name: &str, definition: impl Into<String>) -> Result<Self, SchemaError> {
        Ok(Self {
            name: Identifier::new(name)?,
            definition: definition.into(),
            unique: false,
            method: "btree".to_string(),
            columns: Vec::new(),
            predicate: None,
        })
    }

    /// The index a migration creates for `index`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaReferenceError::Index`] if `index` is not declared on
    /// `table`.
    pub fn declared(table: &TableSpec, index: &IndexSpec) -> Result<Self, SchemaError> {
        let definition = CreateIndex::new(table, index)?.compile().sql;
        let predicate = (!index.conditions().is_empty())
            .then(|| literal::render_conditions(index.conditions()));
        Ok(Self {
            name: Identifier::trusted(index.name()),
            definition,
            unique: index.is_unique(),
            method: index.method().as_sql().to_string(),
            columns: index.columns().to_vec(),
            predicate,
        })
    }

    /// Sets uniqueness.
    #[must_use]
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Sets the access method.
    #[must_use]
    pub fn using(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Sets the key columns.
    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the partial-index predicate.
    #[must_use]
    pub fn predicate(mut self, predicate: Option<impl Into<String>>) -> Self {
        self.predicate = predicate.map(Into::into);
        self
    }

    /// Whether both indexes cover the same columns the same way. Names and
    /// the literal definition text are not compared.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        self.unique == other.unique
            && self.method.eq_ignore_ascii_case(&other.method)
            && self.columns == other.columns
            && match (self.predicate.as_deref(), other.predicate.as_deref()) {
                (None, None) => true,
                (Some(a), Some(b)) => literal::equivalent(a, b),
                _ => false,
            }
    }
}

/// A table as the database reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveTable {
    /// Table name.
    pub name: Identifier,
    /// Columns in attribute order.
    pub columns: Vec<LiveColumn>,
    /// Indexes, excluding the primary key's.
    pub indexes: Vec<LiveIndex>,
}

impl LiveTable {
    /// Creates an empty table snapshot.
    #[must_use]
    pub const fn new(name: Identifier) -> Self {
        Self {
            name,
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Looks up a column.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&LiveColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Looks up a column, failing with an error that names it.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaReferenceError::Field`] when the column is absent.
    pub fn require_column(&self, name: &str) -> Result<&LiveColumn, SchemaReferenceError> {
        self.column(name).ok_or_else(|| SchemaReferenceError::Field {
            table: self.name().to_string(),
            field: name.to_string(),
        })
    }

    /// Looks up an index.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&LiveIndex> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

/// The live database, keyed by table name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSchema {
    /// Tables by name.
    pub tables: BTreeMap<String, LiveTable>,
    /// Installed extensions.
    pub extensions: BTreeSet<String>,
}

impl LiveSchema {
    /// An empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the table, inserting an empty one if absent.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidIdentifier`] for an unusable name.
    pub fn table_entry(&mut self, name: &str) -> Result<&mut LiveTable, SchemaError> {
        match self.tables.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let ident = Identifier::new(name)?;
                Ok(entry.insert(LiveTable::new(ident)))
            }
        }
    }

    /// Records a column.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidIdentifier`] for an unusable name.
    pub fn add_column(&mut self, table: &str, column: LiveColumn) -> Result<(), SchemaError> {
        self.table_entry(table)?.columns.push(column);
        Ok(())
    }

    /// Records an index.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidIdentifier`] for an unusable table name.
    pub fn add_index(&mut self, table: &str, index: LiveIndex) -> Result<(), SchemaError> {
        self.table_entry(table)?.indexes.push(index);
        Ok(())
    }

    /// Records an installed extension.
    pub fn add_extension(&mut self, name: impl Into<String>) {
        self.extensions.insert(name.into());
    }

    /// Looks up a table.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&LiveTable> {
        self.tables.get(name)
    }

    /// The database a fully migrated `schema` would produce.
    #[must_use]
    pub fn from_schema(schema: &Schema) -> Self {
        let mut live = Self::new();
        for extension in schema.required_extensions() {
            live.add_extension(extension);
        }
        for table in schema.tables() {
            let mut snapshot = LiveTable::new(table.ident().clone());
            snapshot.columns = table
                .fields()
                .iter()
                .map(|field| live_column(field, table.primary_key() == Some(field.name())))
                .collect();
            snapshot.indexes = table
                .indexes()
                .iter()
                .filter_map(|index| LiveIndex::declared(table, index).ok())
                .collect();
            live.tables.insert(table.name().to_string(), snapshot);
        }
        live
    }
}

fn live_column(field: &FieldSpec, primary_key: bool) -> LiveColumn {
    LiveColumn {
        name: Identifier::trusted(field.name()),
        data_type: field.field_type().catalog_type(),
        nullable: field.nullable() && !primary_key,
        default: field.default_value().map(literal::render),
    }
}
