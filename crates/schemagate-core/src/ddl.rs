//! DDL statement builders.
//!
//! Each builder validates its references against a [`TableSpec`] when it is
//! constructed, so a typo in a field or index name fails before any database
//! round-trip. Every statement carries an existence guard (`IF [NOT] EXISTS`)
//! where Postgres supports one; running it twice is a no-op.
//!
//! ```rust
//! use schemagate_core::ddl::{AddField, Statement};
//! use schemagate_core::schema::{FieldSpec, FieldType, TableSpec};
//!
//! let table = TableSpec::builder("Widgets")
//!     .field(FieldSpec::new("color", FieldType::text()))
//!     .build()
//!     .unwrap();
//!
//! let compiled = AddField::new(&table, "color").unwrap().compile();
//! assert_eq!(
//!     compiled.sql,
//!     r#"ALTER TABLE "Widgets" ADD COLUMN IF NOT EXISTS "color" TEXT"#
//! );
//! assert!(compiled.args.is_empty());
//!
//! assert!(AddField::new(&table, "size").is_err());
//! ```

use crate::error::{SchemaError, SchemaReferenceError};
use crate::ident::Identifier;
use crate::literal;
use crate::live::LiveTable;
use crate::query::{CompiledQuery, Query};
use crate::schema::{FieldSpec, FieldType, IndexSpec, TableSpec};

/// A compiled-on-demand DDL statement.
pub trait Statement {
    /// The statement's tokens.
    fn query(&self) -> &Query;

    /// Human-readable one-line summary, e.g. `Add field "Posts"."title"`.
    fn describe(&self) -> String;

    /// Compiles the statement. DDL statements never carry bind parameters.
    fn compile(&self) -> CompiledQuery {
        self.query().compile()
    }
}

macro_rules! statement {
    ($name:ident) => {
        impl Statement for $name {
            fn query(&self) -> &Query {
                &self.query
            }

            fn describe(&self) -> String {
                self.description.clone()
            }
        }

        impl From<$name> for Query {
            fn from(statement: $name) -> Self {
                statement.query
            }
        }
    };
}

// ================================================================
// Shared rendering
// ================================================================

fn alter_table(table: &Identifier) -> Query {
    Query::new().raw("ALTER TABLE").ident(table)
}

fn alter_column(table: &Identifier, field: &Identifier) -> Query {
    alter_table(table).raw("ALTER COLUMN").ident(field)
}

/// `"name" TYPE [PRIMARY KEY | NOT NULL] [DEFAULT literal]`
fn column_definition(field: &FieldSpec, primary_key: bool) -> Query {
    let mut query = Query::new()
        .ident(&Identifier::trusted(field.name()))
        .fragment(field.field_type().column_type());
    if primary_key {
        query = query.raw("PRIMARY KEY");
    } else if !field.nullable() {
        query = query.raw("NOT NULL");
    }
    if let Some(default) = field.default_value() {
        query = query.raw("DEFAULT").fragment(literal::render(default));
    }
    query
}

fn field_ident(table: &TableSpec, field: &str) -> Result<Identifier, SchemaReferenceError> {
    table.field(field).map(|f| Identifier::trusted(f.name()))
}

fn describe_field(table: &str, field: &str) -> String {
    format!("\"{table}\".\"{field}\"")
}

/// An index given either by name or by an equivalent declaration.
#[derive(Debug, Clone, Copy)]
pub enum IndexRef<'a> {
    /// Index name.
    Name(&'a str),
    /// Index declaration; matched by name.
    Spec(&'a IndexSpec),
}

impl IndexRef<'_> {
    fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Spec(spec) => spec.name(),
        }
    }
}

impl<'a> From<&'a str> for IndexRef<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

impl<'a> From<&'a String> for IndexRef<'a> {
    fn from(name: &'a String) -> Self {
        Self::Name(name)
    }
}

impl<'a> From<&'a IndexSpec> for IndexRef<'a> {
    fn from(spec: &'a IndexSpec) -> Self {
        Self::Spec(spec)
    }
}

// ================================================================
// Tables
// ================================================================

/// `CREATE TABLE IF NOT EXISTS "T" (<columns>)`
#[derive(Debug, Clone)]
pub struct CreateTable {
    query: Query,
    description: String,
}

impl CreateTable {
    /// Creates the table with every declared field, in declaration order.
    #[must_use]
    pub fn new(table: &TableSpec) -> Self {
        let mut query = Query::new()
            .raw("CREATE TABLE IF NOT EXISTS")
            .ident(table.ident())
            .raw("(");
        for (i, field) in table.fields().iter().enumerate() {
            if i > 0 {
                query = query.raw(",");
            }
            let primary_key = table.primary_key() == Some(field.name());
            query = query.append(column_definition(field, primary_key));
        }
        Self {
            query: query.raw(")"),
            description: format!("Create table \"{}\"", table.name()),
        }
    }
}

statement!(CreateTable);

/// `DROP TABLE IF EXISTS "T"`
#[derive(Debug, Clone)]
pub struct DropTable {
    query: Query,
    description: String,
}

impl DropTable {
    /// Drops a declared table.
    #[must_use]
    pub fn new(table: &TableSpec) -> Self {
        Self::named(table.ident())
    }

    /// Drops a table that exists in the database but not in the schema.
    #[must_use]
    pub fn from_live(table: &LiveTable) -> Self {
        Self::named(&table.name)
    }

    fn named(table: &Identifier) -> Self {
        Self {
            query: Query::new().raw("DROP TABLE IF EXISTS").ident(table),
            description: format!("Drop table \"{table}\""),
        }
    }
}

statement!(DropTable);

// ================================================================
// Fields
// ================================================================

/// `ALTER TABLE "T" ADD COLUMN IF NOT EXISTS "f" TYPE ...`
#[derive(Debug, Clone)]
pub struct AddField {
    query: Query,
    description: String,
}

impl AddField {
    /// Adds a declared field with its type, nullability and default.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaReferenceError::Field`] if `field` is not declared.
    pub fn new(table: &TableSpec, field: &str) -> Result<Self, SchemaReferenceError> {
        let spec = table.field(field)?;
        let primary_key = table.primary_key() == Some(spec.name());
        Ok(Self::build(table.ident(), column_definition(spec, primary_key), field))
    }

    /// Re-adds a live column as it currently exists, without its default.
    ///
    /// Returns `Ok(None)` when the column's type has no declarable equivalent.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaReferenceError::Field`] if the column does not exist.
    pub fn from_live(table: &LiveTable, column: &str) -> Result<Option<Self>, SchemaReferenceError> {
        let live = table.require_column(column)?;
        let Some(field_type) = FieldType::from_catalog(&live.data_type) else {
            return Ok(None);
        };
        let mut definition = Query::new()
            .ident(&live.name)
            .fragment(field_type.column_type());
        if !live.nullable {
            definition = definition.raw("NOT NULL");
        }
        Ok(Some(Self::build(&table.name, definition, column)))
    }

    fn build(table: &Identifier, definition: Query, field: &str) -> Self {
        Self {
            query: alter_table(table)
                .raw("ADD COLUMN IF NOT EXISTS")
                .append(definition),
            description: format!("Add field {}", describe_field(table.as_str(), field)),
        }
    }
}

statement!(AddField);

/// `ALTER TABLE "T" DROP COLUMN IF EXISTS "f"`
#[derive(Debug, Clone)]
pub struct DropField {
    query: Query,
    description: String,
}

impl DropField {
    /// Drops a declared field.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaReferenceError::Field`] if `field` is not declared.
    pub fn new(table: &TableSpec, field: &str) -> Result<Self, SchemaReferenceError> {
        let field = field_ident(table, field)?;
        Ok(Self::build(table.ident(), &field))
    }

    /// Drops a live column that the schema no longer declares.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaReferenceError::Field`] if the column does not exist.
    pub fn from_live(table: &LiveTable, column: &str) -> Result<Self, SchemaReferenceError> {
        let live = table.require_column(column)?;
        Ok(Self::build(&table.name, &live.name))
    }

    fn build(table: &Identifier, field: &Identifier) -> Self {
        Self {
            query: alter_table(table).raw("DROP COLUMN IF EXISTS").ident(field),
            description: format!(
                "Drop field {}",
                describe_field(table.as_str(), field.as_str())
            ),
        }
    }
}

statement!(DropField);

/// `ALTER TABLE "T" ALTER COLUMN "f" TYPE <type>`
///
/// Relies on Postgres' implicit cast between the old and new type; no data
/// is transformed. A cast that Postgres rejects fails when the statement runs.
#[derive(Debug, Clone)]
pub struct UpdateFieldType {
    query: Query,
    description: String,
}

impl UpdateFieldType {
    /// Changes the column to the field's declared type.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaReferenceError::Field`] if `field` is not declared.
    pub fn new(table: &TableSpec, field: &str) -> Result<Self, SchemaReferenceError> {
        let spec = table.field(field)?;
        Self::with_type(table, field, spec.field_type())
    }

    /// Changes the column of a declared field to an explicit type.
    ///
    /// Used to revert a type change.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaReferenceError::Field`] if `field` is not declared.
    pub fn with_type(
        table: &TableSpec,
        field: &str,
        field_type: &FieldType,
    ) -> Result<Self, SchemaReferenceError> {
        let ident = field_ident(table, field)?;
        Ok(Self {
            query: alter_column(table.ident(), &ident)
                .raw("TYPE")
                .fragment(field_type.column_type()),
            description: format!(
                "Change type of {} to {}",
                describe_field(table.name(), field),
                field_type.column_type()
            ),
        })
    }
}

statement!(UpdateFieldType);

/// `ALTER TABLE "T" ALTER COLUMN "f" SET NOT NULL`
#[derive(Debug, Clone)]
pub struct SetNotNull {
    query: Query,
    description: String,
}

impl SetNotNull {
    /// Forbids NULL in the column.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaReferenceError::Field`] if `field` is not declared.
    pub fn new(table: &TableSpec, field: &str) -> Result<Self, SchemaReferenceError> {
        let ident = field_ident(table, field)?;
        Ok(Self {
            query: alter_column(table.ident(), &ident).raw("SET NOT NULL"),
            description: format!("Make {} not nullable", describe_field(table.name(), field)),
        })
    }
}

statement!(SetNotNull);

/// `ALTER TABLE "T" ALTER COLUMN "f" DROP NOT NULL`
#[derive(Debug, Clone)]
pub struct DropNotNull {
    query: Query,
    description: String,
}

impl DropNotNull {
    /// Allows NULL in the column.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaReferenceError::Field`] if `field` is not declared.
    pub fn new(table: &TableSpec, field: &str) -> Result<Self, SchemaReferenceError> {
        let ident = field_ident(table, field)?;
        Ok(Self {
            query: alter_column(table.ident(), &ident).raw("DROP NOT NULL"),
            description: format!("Make {} nullable", describe_field(table.name(), field)),
        })
    }
}

statement!(DropNotNull);

/// `ALTER TABLE "T" ALTER COLUMN "f" SET DEFAULT <literal>`
#[derive(Debug, Clone)]
pub struct SetDefaultValue {
    query: Query,
    description: String,
}

impl SetDefaultValue {
    /// Sets the column default to the field's declared default.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaReferenceError::Field`] if `field` is not declared and
    /// [`SchemaReferenceError::Default`] if it declares no default.
    pub fn new(table: &TableSpec, field: &str) -> Result<Self, SchemaReferenceError> {
        let spec = table.field(field)?;
        let default = spec
            .default_value()
            .ok_or_else(|| SchemaReferenceError::Default {
                table: table.name().to_string(),
                field: field.to_string(),
            })?;
        Ok(Self {
            query: alter_column(table.ident(), &Identifier::trusted(spec.name()))
                .raw("SET DEFAULT")
                .fragment(literal::render(default)),
            description: format!("Set default of {}", describe_field(table.name(), field)),
        })
    }
}

statement!(SetDefaultValue);

/// `ALTER TABLE "T" ALTER COLUMN "f" DROP DEFAULT`
#[derive(Debug, Clone)]
pub struct DropDefaultValue {
    query: Query,
    description: String,
}

impl DropDefaultValue {
    /// Removes the column default.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaReferenceError::Field`] if `field` is not declared.
    pub fn new(table: &TableSpec, field: &str) -> Result<Self, SchemaReferenceError> {
        let ident = field_ident(table, field)?;
        Ok(Self {
            query: alter_column(table.ident(), &ident).raw("DROP DEFAULT"),
            description: format!("Drop default of {}", describe_field(table.name(), field)),
        })
    }
}

statement!(DropDefaultValue);

// ================================================================
// Indexes
// ================================================================

/// `CREATE [UNIQUE] INDEX IF NOT EXISTS "i" ON "T" USING <method> (...) [WHERE ...]`
#[derive(Debug, Clone)]
pub struct CreateIndex {
    query: Query,
    description: String,
}

impl CreateIndex {
    /// Creates a declared index.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaReferenceError::Index`] if the index is not declared.
    pub fn new<'a>(
        table: &TableSpec,
        index: impl Into<IndexRef<'a>>,
    ) -> Result<Self, SchemaReferenceError> {
        let index: IndexRef<'a> = index.into();
        let spec = table.index(index.name())?;
        let head = if spec.is_unique() {
            "CREATE UNIQUE INDEX IF NOT EXISTS"
        } else {
            "CREATE INDEX IF NOT EXISTS"
        };
        let mut query = Query::new()
            .raw(head)
            .ident(&Identifier::trusted(spec.name()))
            .raw("ON")
            .ident(table.ident())
            .raw("USING")
            .raw(spec.method().as_sql())
            .raw("(");
        for (i, column) in spec.columns().iter().enumerate() {
            if i > 0 {
                query = query.raw(",");
            }
            query = query.ident(&Identifier::trusted(column));
        }
        query = query.raw(")");
        if !spec.conditions().is_empty() {
            query = query
                .raw("WHERE")
                .fragment(literal::render_conditions(spec.conditions()));
        }
        Ok(Self {
            query,
            description: format!(
                "Create index \"{}\" on \"{}\"",
                spec.name(),
                table.name()
            ),
        })
    }
}

statement!(CreateIndex);

/// `DROP INDEX IF EXISTS "i"`
#[derive(Debug, Clone)]
pub struct DropIndex {
    query: Query,
    description: String,
}

impl DropIndex {
    /// Drops a declared index, given by name or declaration.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaReferenceError::Index`] if the index is not declared.
    pub fn new<'a>(
        table: &TableSpec,
        index: impl Into<IndexRef<'a>>,
    ) -> Result<Self, SchemaReferenceError> {
        let index: IndexRef<'a> = index.into();
        let spec = table.index(index.name())?;
        Ok(Self::named(&Identifier::trusted(spec.name()), table.name()))
    }

    /// Drops a live index that the schema no longer declares.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaReferenceError::Index`] if the index does not exist.
    pub fn from_live(table: &LiveTable, index: &str) -> Result<Self, SchemaReferenceError> {
        let live = table
            .index(index)
            .ok_or_else(|| SchemaReferenceError::Index {
                table: table.name().to_string(),
                index: index.to_string(),
            })?;
        Ok(Self::named(&live.name, table.name()))
    }

    fn named(index: &Identifier, table: &str) -> Self {
        Self {
            query: Query::new().raw("DROP INDEX IF EXISTS").ident(index),
            description: format!("Drop index \"{index}\" on \"{table}\""),
        }
    }
}

statement!(DropIndex);

// ================================================================
// Extensions
// ================================================================

/// `CREATE EXTENSION IF NOT EXISTS "name" CASCADE`
#[derive(Debug, Clone)]
pub struct CreateExtension {
    query: Query,
    description: String,
}

impl CreateExtension {
    /// Installs an extension and anything it depends on.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidIdentifier`] for an unusable name.
    pub fn new(name: &str) -> Result<Self, SchemaError> {
        let ident = Identifier::new(name)?;
        Ok(Self {
            query: Query::new()
                .raw("CREATE EXTENSION IF NOT EXISTS")
                .ident(&ident)
                .raw("CASCADE"),
            description: format!("Create extension \"{name}\""),
        })
    }
}

statement!(CreateExtension);

/// `DROP EXTENSION IF EXISTS "name"`
#[derive(Debug, Clone)]
pub struct DropExtension {
    query: Query,
    description: String,
}

impl DropExtension {
    /// Removes an extension.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidIdentifier`] for an unusable name.
    pub fn new(name: &str) -> Result<Self, SchemaError> {
        let ident = Identifier::new(name)?;
        Ok(Self {
            query: Query::new().raw("DROP EXTENSION IF EXISTS").ident(&ident),
            description: format!("Drop extension \"{name}\""),
        })
    }
}

statement!(DropExtension);
