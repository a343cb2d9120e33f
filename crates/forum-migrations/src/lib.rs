//! Schema and migrations of a small forum.
//!
//! The schema in [`schema`] is the source of truth; [`migrations`] brings a
//! database from nothing to that shape. `forum-migrate check` fails in CI
//! when the two drift apart.

pub mod migrations;
pub mod schema;
