//! Generated migration `20261018T120000.add_user_email`.
//!
//! Changes:
//! - Add field "Users"."email"

use schemagate_migrate::migration::StaticMigration;

pub const MIGRATION: StaticMigration = StaticMigration {
    name: "20261018T120000.add_user_email",
    accepts_schema_hash: Some("c807664c09e0c45387247c09e72e36895b870bd1722e21a00816f3f411b07477"),
    up: &[
        r#"ALTER TABLE "Users" ADD COLUMN IF NOT EXISTS "email" TEXT"#,
    ],
    down: Some(&[
        r#"ALTER TABLE "Users" DROP COLUMN IF EXISTS "email""#,
    ]),
};
