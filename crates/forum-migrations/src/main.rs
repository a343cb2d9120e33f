//! forum-migrate CLI
//!
//! Applies, inspects and generates the forum's migrations.

use forum_migrations::{migrations, schema};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    schemagate_migrate::cli::run(schema::forum()?, migrations::all()?).await
}
