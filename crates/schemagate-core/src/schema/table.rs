//! Table declarations.

use std::collections::HashSet;

use crate::error::{SchemaError, SchemaReferenceError};
use crate::ident::Identifier;

use super::field::FieldSpec;
use super::index::{IndexMethod, IndexSpec};

/// A validated table declaration.
///
/// Only [`TableSpecBuilder::build`] produces one, so every index column,
/// predicate field and primary key of a `TableSpec` names a declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    name: Identifier,
    fields: Vec<FieldSpec>,
    indexes: Vec<IndexSpec>,
    primary_key: Option<String>,
}

impl TableSpec {
    /// Starts declaring a table.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> TableSpecBuilder {
        TableSpecBuilder {
            name: name.into(),
            fields: Vec::new(),
            indexes: Vec::new(),
            primary_key: None,
        }
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Table name as an identifier.
    #[must_use]
    pub const fn ident(&self) -> &Identifier {
        &self.name
    }

    /// Fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Indexes in declaration order.
    #[must_use]
    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    /// Primary key field, if declared.
    #[must_use]
    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    /// Looks up a field by name.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaReferenceError::Field`] when the table has no such field.
    pub fn field(&self, name: &str) -> Result<&FieldSpec, SchemaReferenceError> {
        self.fields
            .iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| SchemaReferenceError::Field {
                table: self.name().to_string(),
                field: name.to_string(),
            })
    }

    /// Looks up an index by name.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaReferenceError::Index`] when the table has no such index.
    pub fn index(&self, name: &str) -> Result<&IndexSpec, SchemaReferenceError> {
        self.indexes
            .iter()
            .find(|i| i.name() == name)
            .ok_or_else(|| SchemaReferenceError::Index {
                table: self.name().to_string(),
                index: name.to_string(),
            })
    }

    /// Whether the table declares a field with this name.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name() == name)
    }

    /// Whether the table declares an index with this name.
    #[must_use]
    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.iter().any(|i| i.name() == name)
    }
}

/// Builder for [`TableSpec`].
#[derive(Debug, Clone)]
pub struct TableSpecBuilder {
    name: String,
    fields: Vec<FieldSpec>,
    indexes: Vec<IndexSpec>,
    primary_key: Option<String>,
}

impl TableSpecBuilder {
    /// Appends a field.
    #[must_use]
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Appends an index.
    #[must_use]
    pub fn index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    /// Declares the primary key field.
    #[must_use]
    pub fn primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = Some(field.into());
        self
    }

    /// Validates the declaration.
    ///
    /// # Errors
    ///
    /// Fails on invalid identifiers, duplicate field or index names,
    /// unsupported field types, and any index column, predicate field or
    /// primary key that does not name a declared field.
    pub fn build(self) -> Result<TableSpec, SchemaError> {
        let name = Identifier::new(self.name)?;
        let table = name.as_str();

        let mut seen = HashSet::new();
        for field in &self.fields {
            Identifier::new(field.name())?;
            if !seen.insert(field.name()) {
                return Err(SchemaError::DuplicateField {
                    table: table.to_string(),
                    field: field.name().to_string(),
                });
            }
            if let Some(reason) = field.field_type().invalid_reason() {
                return Err(SchemaError::InvalidFieldType {
                    table: table.to_string(),
                    field: field.name().to_string(),
                    reason,
                });
            }
        }

        let missing_field = |field: &str| SchemaReferenceError::Field {
            table: table.to_string(),
            field: field.to_string(),
        };

        if let Some(pk) = &self.primary_key {
            if !seen.contains(pk.as_str()) {
                return Err(missing_field(pk).into());
            }
        }

        let mut index_names = HashSet::new();
        let mut indexes = self.indexes;
        for index in &mut indexes {
            Identifier::new(index.name())?;
            if !index_names.insert(index.name().to_string()) {
                return Err(SchemaError::DuplicateIndex {
                    table: table.to_string(),
                    index: index.name().to_string(),
                });
            }
            if index.columns().is_empty() {
                return Err(SchemaError::EmptyIndex {
                    table: table.to_string(),
                    index: index.name().to_string(),
                });
            }
            for column in index.columns() {
                if !seen.contains(column.as_str()) {
                    return Err(missing_field(column).into());
                }
            }
            for condition in index.conditions() {
                if !seen.contains(condition.field()) {
                    return Err(missing_field(condition.field()).into());
                }
            }
            if index.explicit_method().is_none() {
                let any_json = index.columns().iter().any(|column| {
                    self.fields
                        .iter()
                        .any(|f| f.name() == column && f.field_type().is_json())
                });
                let method = if any_json && !index.is_unique() {
                    IndexMethod::Gin
                } else {
                    IndexMethod::BTree
                };
                index.resolve_method(method);
            }
        }

        Ok(TableSpec {
            name,
            fields: self.fields,
            indexes,
            primary_key: self.primary_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, IndexCondition};

    fn widgets() -> TableSpecBuilder {
        TableSpec::builder("Widgets")
            .field(FieldSpec::new("_id", FieldType::id()).not_null())
            .field(FieldSpec::new("color", FieldType::text()))
            .field(FieldSpec::new("meta", FieldType::json()))
            .primary_key("_id")
    }

    #[test]
    fn test_build_keeps_declaration_order() {
        let table = widgets().build().unwrap();
        let names: Vec<&str> = table.fields().iter().map(FieldSpec::name).collect();
        assert_eq!(names, ["_id", "color", "meta"]);
        assert_eq!(table.primary_key(), Some("_id"));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let err = widgets()
            .field(FieldSpec::new("color", FieldType::integer()))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { .. }));
    }

    #[test]
    fn test_index_on_missing_field_rejected() {
        let err = widgets()
            .index(IndexSpec::new("idx_size", ["size"]))
            .build()
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("Field \"size\" does not exist in the schema"));
    }

    #[test]
    fn test_predicate_on_missing_field_rejected() {
        let err = widgets()
            .index(IndexSpec::new("idx_color", ["color"]).condition(IndexCondition::IsNull(
                "deleted".into(),
            )))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            SchemaError::Reference(SchemaReferenceError::Field { .. })
        ));
    }

    #[test]
    fn test_json_index_uses_gin() {
        let table = widgets()
            .index(IndexSpec::for_columns("Widgets", ["meta"]))
            .index(IndexSpec::for_columns("Widgets", ["color"]))
            .build()
            .unwrap();
        assert_eq!(table.indexes()[0].method(), IndexMethod::Gin);
        assert_eq!(table.indexes()[1].method(), IndexMethod::BTree);
    }

    #[test]
    fn test_lookup_errors_name_the_identifier() {
        let table = widgets().build().unwrap();
        let err = table.field("nonexistent").unwrap_err();
        assert!(err
            .to_string()
            .contains("Field \"nonexistent\" does not exist in the schema"));
        assert!(table.index("nope").is_err());
    }
}
