use async_trait::async_trait;
use schemagate_migrate::migration::{Migration, MigrationContext};

pub struct AddComments;

#[async_trait]
impl Migration for AddComments {
    fn name(&self) -> &str {
        "20260215T093000.add_comments"
    }

    fn is_reversible(&self) -> bool {
        true
    }

    async fn up(&self, ctx: &MigrationContext<'_>) -> schemagate_migrate::Result<()> {
        ctx.create_table("Comments").await?;
        ctx.update_indexes("Comments").await
    }

    async fn down(&self, ctx: &MigrationContext<'_>) -> schemagate_migrate::Result<()> {
        ctx.drop_table("Comments").await
    }
}
