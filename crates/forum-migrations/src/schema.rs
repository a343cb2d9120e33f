//! Declared forum tables.

use schemagate_core::schema::{FieldSpec, FieldType, IndexSpec, Literal, TableSpec};
use schemagate_core::{Schema, SchemaError};

/// Forum users.
///
/// # Errors
///
/// Only if the declaration itself is invalid.
pub fn users() -> Result<TableSpec, SchemaError> {
    TableSpec::builder("Users")
        .field(FieldSpec::new("_id", FieldType::id()).not_null())
        .field(FieldSpec::new("username", FieldType::text()).not_null())
        .field(FieldSpec::new("email", FieldType::text()))
        .field(
            FieldSpec::new("karma", FieldType::integer())
                .not_null()
                .with_default(Literal::Int(0)),
        )
        .field(
            FieldSpec::new("createdAt", FieldType::timestamp())
                .not_null()
                .with_default(Literal::Now),
        )
        .primary_key("_id")
        .index(IndexSpec::for_columns("Users", ["username"]).unique())
        .build()
}

/// Posts, written by users.
///
/// # Errors
///
/// Only if the declaration itself is invalid.
pub fn posts() -> Result<TableSpec, SchemaError> {
    TableSpec::builder("Posts")
        .field(FieldSpec::new("_id", FieldType::id()).not_null())
        .field(FieldSpec::new("userId", FieldType::foreign_key("Users")))
        .field(FieldSpec::new("title", FieldType::text()).not_null())
        .field(FieldSpec::new("body", FieldType::text()))
        .field(
            FieldSpec::new("draft", FieldType::boolean())
                .not_null()
                .with_default(Literal::Bool(false)),
        )
        .field(
            FieldSpec::new("createdAt", FieldType::timestamp())
                .not_null()
                .with_default(Literal::Now),
        )
        .primary_key("_id")
        .index(IndexSpec::for_columns("Posts", ["userId"]))
        .build()
}

/// Comments on posts.
///
/// # Errors
///
/// Only if the declaration itself is invalid.
pub fn comments() -> Result<TableSpec, SchemaError> {
    TableSpec::builder("Comments")
        .field(FieldSpec::new("_id", FieldType::id()).not_null())
        .field(FieldSpec::new("postId", FieldType::foreign_key("Posts")))
        .field(FieldSpec::new("userId", FieldType::foreign_key("Users")))
        .field(FieldSpec::new("contents", FieldType::text()).not_null())
        .field(
            FieldSpec::new("createdAt", FieldType::timestamp())
                .not_null()
                .with_default(Literal::Now),
        )
        .primary_key("_id")
        .index(IndexSpec::for_columns("Comments", ["postId"]))
        .build()
}

/// The whole forum schema.
///
/// # Errors
///
/// Only if the declaration itself is invalid.
pub fn forum() -> Result<Schema, SchemaError> {
    Schema::builder()
        .table(users()?)
        .table(posts()?)
        .table(comments()?)
        .build()
}
