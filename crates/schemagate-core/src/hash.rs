//! Canonical serialization and hashing of a [`Schema`].
//!
//! The canonical text lists tables sorted by name, and within each table its
//! fields and indexes sorted by name. Each line records what a migration has
//! to care about: the declared type, nullability, whether a default exists,
//! and the shape of every index. Ids and foreign keys share a column type but
//! are spelled apart, so pointing a reference at another table changes the
//! hash. Declaration order and default *values* do not affect the hash.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::ident::Identifier;
use crate::literal;
use crate::schema::{FieldSpec, FieldType, IndexSpec, ScalarKind, Schema, TableSpec};

/// Hex-encoded SHA-256 digest of a schema's canonical text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaHash(String);

impl SchemaHash {
    /// Hashes the schema.
    #[must_use]
    pub fn compute(schema: &Schema) -> Self {
        Self::of_canonical_text(&canonical_text(schema))
    }

    /// Hashes already-canonicalized text.
    #[must_use]
    pub fn of_canonical_text(text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wraps a hash recorded elsewhere, e.g. in a migration.
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into().to_ascii_lowercase())
    }

    /// The hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a recorded hash string matches this one.
    #[must_use]
    pub fn matches(&self, recorded: &str) -> bool {
        self.0.eq_ignore_ascii_case(recorded.trim())
    }
}

impl fmt::Display for SchemaHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Renders the schema in its canonical, order-independent form.
#[must_use]
pub fn canonical_text(schema: &Schema) -> String {
    let mut tables: Vec<&TableSpec> = schema.tables().iter().collect();
    tables.sort_by(|a, b| a.name().cmp(b.name()));

    let mut out = String::new();
    for table in tables {
        canonical_table(&mut out, table);
    }
    out
}

fn canonical_table(out: &mut String, table: &TableSpec) {
    out.push_str("table ");
    out.push_str(&table.ident().quoted());
    if let Some(pk) = table.primary_key() {
        out.push_str(" primary_key ");
        out.push_str(&Identifier::trusted(pk).quoted());
    }
    out.push('\n');

    let mut fields: Vec<&FieldSpec> = table.fields().iter().collect();
    fields.sort_by(|a, b| a.name().cmp(b.name()));
    for field in fields {
        out.push_str(&format!(
            "  field {} {} {} {}\n",
            Identifier::trusted(field.name()).quoted(),
            canonical_type(field.field_type()),
            if field.nullable() { "nullable" } else { "not_null" },
            if field.has_default() { "default" } else { "no_default" },
        ));
    }

    let mut indexes: Vec<&IndexSpec> = table.indexes().iter().collect();
    indexes.sort_by(|a, b| a.name().cmp(b.name()));
    for index in indexes {
        let columns: Vec<String> = index
            .columns()
            .iter()
            .map(|c| Identifier::trusted(c).quoted())
            .collect();
        out.push_str(&format!(
            "  index {} {} {} ({})",
            Identifier::trusted(index.name()).quoted(),
            if index.is_unique() { "unique" } else { "non_unique" },
            index.method().as_sql(),
            columns.join(", "),
        ));
        if !index.conditions().is_empty() {
            out.push_str(" where ");
            out.push_str(&literal::render_conditions(index.conditions()));
        }
        out.push('\n');
    }
}

fn canonical_type(field_type: &FieldType) -> String {
    match field_type {
        FieldType::Scalar(ScalarKind::Id) => "ID".to_string(),
        FieldType::ForeignKey(table) => format!("FK({})", Identifier::trusted(table).quoted()),
        FieldType::Array(inner) => format!("{}[]", canonical_type(inner)),
        other => other.column_type(),
    }
}
