#![allow(dead_code)]

use schemagate_core::schema::{
    Comparison, FieldSpec, FieldType, IndexCondition, IndexSpec, Literal, Schema, TableSpec,
};

pub fn table(name: &str, fields: Vec<FieldSpec>) -> TableSpec {
    fields
        .into_iter()
        .fold(TableSpec::builder(name), |builder, field| builder.field(field))
        .build()
        .unwrap_or_else(|e| panic!("Failed to build table {name}: {e}"))
}

pub fn widgets() -> TableSpec {
    table("Widgets", vec![FieldSpec::new("color", FieldType::text())])
}

pub fn users() -> TableSpec {
    TableSpec::builder("Users")
        .field(FieldSpec::new("_id", FieldType::id()).not_null())
        .field(FieldSpec::new("username", FieldType::text()).not_null())
        .field(FieldSpec::new("karma", FieldType::integer()).not_null().with_default(Literal::Int(0)))
        .field(FieldSpec::new("createdAt", FieldType::timestamp()).not_null().with_default(Literal::Now))
        .primary_key("_id")
        .index(IndexSpec::for_columns("Users", ["username"]).unique())
        .build()
        .unwrap()
}

pub fn posts() -> TableSpec {
    TableSpec::builder("Posts")
        .field(FieldSpec::new("_id", FieldType::id()).not_null())
        .field(FieldSpec::new("userId", FieldType::foreign_key("Users")))
        .field(FieldSpec::new("title", FieldType::text()).not_null())
        .field(FieldSpec::new("draft", FieldType::boolean()).not_null().with_default(Literal::Bool(false)))
        .field(FieldSpec::new("tagIds", FieldType::array(FieldType::id())).with_default(Literal::EmptyArray))
        .field(FieldSpec::new("contents", FieldType::json()))
        .primary_key("_id")
        .index(IndexSpec::for_columns("Posts", ["userId", "title"]))
        .index(IndexSpec::for_columns("Posts", ["contents"]))
        .index(
            IndexSpec::new("idx_Posts_published", ["userId"])
                .condition(IndexCondition::eq("draft", Literal::Bool(false)))
                .condition(IndexCondition::compare("title", Comparison::NotEq, Literal::text(""))),
        )
        .build()
        .unwrap()
}

pub fn forum() -> Schema {
    Schema::builder()
        .table(users())
        .table(posts())
        .build()
        .unwrap()
}
