//! # schemagate-core
//!
//! The I/O-free half of schemagate: a declarative schema model, a compiler
//! from schema operations to Postgres DDL, a stable schema hash, and a diff
//! between the declared schema and a snapshot of a live database.
//!
//! This crate provides:
//! - [`schema`]: tables, fields, types and indexes, validated once at startup
//! - [`query`]: token-based queries compiled to `{sql, args}` with `$n` placeholders
//! - [`ddl`]: one builder per DDL operation, checked against the schema
//! - [`hash`]: canonical text and SHA-256 digest of a schema
//! - [`live`] and [`diff`]: introspected snapshots and the changes that converge them
//!
//! ## Building DDL
//!
//! ```rust
//! use schemagate_core::ddl::{CreateExtension, DropIndex, Statement};
//! use schemagate_core::schema::{FieldSpec, FieldType, IndexSpec, TableSpec};
//!
//! let table = TableSpec::builder("Posts")
//!     .field(FieldSpec::new("title", FieldType::text()))
//!     .index(IndexSpec::new("idx_name", ["title"]))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(
//!     DropIndex::new(&table, "idx_name").unwrap().compile().sql,
//!     r#"DROP INDEX IF EXISTS "idx_name""#
//! );
//! assert_eq!(
//!     CreateExtension::new("vector").unwrap().compile().sql,
//!     r#"CREATE EXTENSION IF NOT EXISTS "vector" CASCADE"#
//! );
//! ```

pub mod ddl;
pub mod diff;
pub mod error;
pub mod hash;
pub mod ident;
mod literal;
pub mod live;
pub mod query;
pub mod schema;
pub mod value;

pub use ddl::Statement;
pub use error::{SchemaError, SchemaReferenceError};
pub use hash::SchemaHash;
pub use ident::Identifier;
pub use query::{CompiledQuery, Query};
pub use schema::Schema;
pub use value::{NullKind, SqlValue, ToSqlValue};
