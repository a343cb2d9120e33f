//! Error types for schema declaration and query construction.

/// A query referenced a table, field, index or default that the schema
/// does not declare.
///
/// Raised while a statement is being constructed, before any database I/O.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaReferenceError {
    /// The table is not part of the schema.
    #[error("Table \"{table}\" does not exist in the schema")]
    Table {
        /// Name of the missing table.
        table: String,
    },

    /// The field is not declared on the table.
    #[error("Field \"{field}\" does not exist in the schema for table \"{table}\"")]
    Field {
        /// Table that was searched.
        table: String,
        /// Name of the missing field.
        field: String,
    },

    /// The index is not declared on the table.
    #[error("Index \"{index}\" does not exist in the schema for table \"{table}\"")]
    Index {
        /// Table that was searched.
        table: String,
        /// Name of the missing index.
        index: String,
    },

    /// The field exists but declares no default value.
    #[error("Field \"{field}\" on table \"{table}\" does not declare a default value")]
    Default {
        /// Table owning the field.
        table: String,
        /// Field without a default.
        field: String,
    },
}

/// The schema declaration itself is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// An identifier cannot be used as a Postgres name.
    #[error("Invalid identifier \"{name}\": {reason}")]
    InvalidIdentifier {
        /// The rejected identifier.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Two tables share a name.
    #[error("Table \"{0}\" is declared more than once")]
    DuplicateTable(String),

    /// Two fields of one table share a name.
    #[error("Field \"{field}\" is declared more than once on table \"{table}\"")]
    DuplicateField {
        /// Table owning the fields.
        table: String,
        /// Repeated field name.
        field: String,
    },

    /// Two indexes of one table share a name.
    #[error("Index \"{index}\" is declared more than once on table \"{table}\"")]
    DuplicateIndex {
        /// Table owning the indexes.
        table: String,
        /// Repeated index name.
        index: String,
    },

    /// A field type cannot be represented.
    #[error("Field \"{field}\" on table \"{table}\" has an unsupported type: {reason}")]
    InvalidFieldType {
        /// Table owning the field.
        table: String,
        /// Offending field.
        field: String,
        /// Why the type is rejected.
        reason: &'static str,
    },

    /// An index declares no columns.
    #[error("Index \"{index}\" on table \"{table}\" has no columns")]
    EmptyIndex {
        /// Table owning the index.
        table: String,
        /// Offending index.
        index: String,
    },

    /// A declaration points at something that does not exist.
    #[error(transparent)]
    Reference(#[from] SchemaReferenceError),
}
