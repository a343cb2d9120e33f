//! Schema diff: the ordered DDL that converges a live database to a
//! declared [`Schema`].
//!
//! Ordering rules:
//!
//! 1. Missing extensions are created first, since column types may need them.
//! 2. Declared tables are visited in declaration order. A missing table is
//!    created together with its indexes. For an existing table, each declared
//!    field (in declaration order) is added or has its type, nullability and
//!    default adjusted. Undeclared columns are dropped next, then undeclared
//!    and redefined indexes, then missing and redefined indexes are created.
//!
//! Defaults and index predicates are compared by value, after normalizing
//! the catalog's spelling. An index is redefined when its uniqueness, method,
//! columns or predicate differ from the declaration.
//! 3. Live tables that are neither declared nor ignored are dropped last.

use std::collections::BTreeSet;

use crate::ddl::{
    AddField, CreateExtension, CreateIndex, CreateTable, DropDefaultValue, DropExtension,
    DropField, DropIndex, DropNotNull, DropTable, SetDefaultValue, SetNotNull, Statement,
    UpdateFieldType,
};
use crate::error::SchemaError;
use crate::literal;
use crate::live::{LiveIndex, LiveSchema, LiveTable};
use crate::query::Query;
use crate::schema::{FieldType, Schema, TableSpec};

/// One step of a diff, with its inverse when one can be derived.
#[derive(Debug, Clone)]
pub struct PlannedChange {
    /// What the step does, e.g. `Add field "Posts"."title"`.
    pub description: String,
    /// Forward statement.
    pub up: Query,
    /// Statement that undoes `up`, if known.
    pub down: Option<Query>,
}

impl PlannedChange {
    fn reversible(up: impl Statement + Into<Query>, down: impl Into<Query>) -> Self {
        Self {
            description: up.describe(),
            up: up.into(),
            down: Some(down.into()),
        }
    }

    fn with_optional_down(up: impl Statement + Into<Query>, down: Option<Query>) -> Self {
        Self {
            description: up.describe(),
            up: up.into(),
            down,
        }
    }

    fn irreversible(up: impl Statement + Into<Query>) -> Self {
        Self::with_optional_down(up, None)
    }
}

/// Knobs for [`SchemaDiff::compute`].
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    /// Live tables the diff must never drop, such as the migration history.
    pub ignored_tables: BTreeSet<String>,
}

impl DiffOptions {
    /// Ignores a live table.
    #[must_use]
    pub fn ignore_table(mut self, table: impl Into<String>) -> Self {
        self.ignored_tables.insert(table.into());
        self
    }
}

/// Ordered changes from a live database to the declared schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaDiff {
    /// Changes in execution order.
    pub changes: Vec<PlannedChange>,
}

impl SchemaDiff {
    /// Computes the changes that take `live` to `schema`.
    ///
    /// # Errors
    ///
    /// Only fails if the schema or snapshot holds a name that cannot be used
    /// as an identifier.
    pub fn compute(
        schema: &Schema,
        live: &LiveSchema,
        options: &DiffOptions,
    ) -> Result<Self, SchemaError> {
        let mut changes = Vec::new();

        for extension in schema.required_extensions() {
            if !live.extensions.contains(extension) {
                changes.push(PlannedChange::reversible(
                    CreateExtension::new(extension)?,
                    DropExtension::new(extension)?,
                ));
            }
        }

        for table in schema.tables() {
            match live.table(table.name()) {
                None => create_table(table, &mut changes)?,
                Some(live_table) => diff_table(table, live_table, &mut changes)?,
            }
        }

        for (name, live_table) in &live.tables {
            if options.ignored_tables.contains(name) || schema.table(name).is_ok() {
                continue;
            }
            changes.push(PlannedChange::irreversible(DropTable::from_live(live_table)));
        }

        Ok(Self { changes })
    }

    /// `true` if the database already matches the schema.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Forward statements, in order.
    pub fn up(&self) -> impl Iterator<Item = &Query> {
        self.changes.iter().map(|c| &c.up)
    }

    /// Inverse statements in reverse order, or `None` if any change cannot be
    /// undone automatically.
    #[must_use]
    pub fn down(&self) -> Option<Vec<&Query>> {
        self.changes.iter().rev().map(|c| c.down.as_ref()).collect()
    }

    /// Changes that have no automatic inverse.
    #[must_use]
    pub fn irreversible(&self) -> Vec<&PlannedChange> {
        self.changes.iter().filter(|c| c.down.is_none()).collect()
    }
}

fn create_table(table: &TableSpec, changes: &mut Vec<PlannedChange>) -> Result<(), SchemaError> {
    changes.push(PlannedChange::reversible(
        CreateTable::new(table),
        DropTable::new(table),
    ));
    for index in table.indexes() {
        changes.push(PlannedChange::reversible(
            CreateIndex::new(table, index)?,
            DropIndex::new(table, index)?,
        ));
    }
    Ok(())
}

fn diff_table(
    table: &TableSpec,
    live: &LiveTable,
    changes: &mut Vec<PlannedChange>,
) -> Result<(), SchemaError> {
    for field in table.fields() {
        let name = field.name();
        let Some(column) = live.column(name) else {
            changes.push(PlannedChange::reversible(
                AddField::new(table, name)?,
                DropField::new(table, name)?,
            ));
            continue;
        };

        if column.data_type != field.field_type().catalog_type() {
            let down = FieldType::from_catalog(&column.data_type)
                .map(|old| UpdateFieldType::with_type(table, name, &old))
                .transpose()?
                .map(Query::from);
            changes.push(PlannedChange::with_optional_down(
                UpdateFieldType::new(table, name)?,
                down,
            ));
        }

        let nullable = field.nullable() && table.primary_key() != Some(name);
        if nullable != column.nullable {
            if nullable {
                changes.push(PlannedChange::reversible(
                    DropNotNull::new(table, name)?,
                    SetNotNull::new(table, name)?,
                ));
            } else {
                changes.push(PlannedChange::reversible(
                    SetNotNull::new(table, name)?,
                    DropNotNull::new(table, name)?,
                ));
            }
        }

        let declared_default = field.default_value().map(literal::render);
        if !column.default_matches(declared_default.as_deref()) {
            match (declared_default, column.default.as_ref()) {
                (Some(_), None) => changes.push(PlannedChange::reversible(
                    SetDefaultValue::new(table, name)?,
                    DropDefaultValue::new(table, name)?,
                )),
                // the previous expression is not restored
                (Some(_), Some(_)) => changes.push(PlannedChange::irreversible(
                    SetDefaultValue::new(table, name)?,
                )),
                (None, _) => changes.push(PlannedChange::irreversible(
                    DropDefaultValue::new(table, name)?,
                )),
            }
        }
    }

    for column in &live.columns {
        if !table.has_field(column.name.as_str()) {
            let down = AddField::from_live(live, column.name.as_str())?.map(Query::from);
            changes.push(PlannedChange::with_optional_down(
                DropField::from_live(live, column.name.as_str())?,
                down,
            ));
        }
    }

    let mut redefined = Vec::new();
    for index in &live.indexes {
        let stale = match table.index(index.name.as_str()) {
            Ok(spec) => {
                let is_stale = !index.same_shape(&LiveIndex::declared(table, spec)?);
                if is_stale {
                    redefined.push(spec.name());
                }
                is_stale
            }
            Err(_) => true,
        };
        if stale {
            changes.push(PlannedChange::irreversible(DropIndex::from_live(
                live,
                index.name.as_str(),
            )?));
        }
    }

    for index in table.indexes() {
        if live.index(index.name()).is_none() || redefined.contains(&index.name()) {
            changes.push(PlannedChange::reversible(
                CreateIndex::new(table, index)?,
                DropIndex::new(table, index)?,
            ));
        }
    }

    Ok(())
}
