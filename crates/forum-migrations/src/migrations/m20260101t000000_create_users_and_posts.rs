use async_trait::async_trait;
use schemagate_migrate::migration::{Migration, MigrationContext};

pub struct CreateUsersAndPosts;

#[async_trait]
impl Migration for CreateUsersAndPosts {
    fn name(&self) -> &str {
        "20260101T000000.create_users_and_posts"
    }

    fn is_reversible(&self) -> bool {
        true
    }

    async fn up(&self, ctx: &MigrationContext<'_>) -> schemagate_migrate::Result<()> {
        ctx.create_table("Users").await?;
        ctx.update_indexes("Users").await?;
        ctx.create_table("Posts").await?;
        ctx.update_indexes("Posts").await
    }

    async fn down(&self, ctx: &MigrationContext<'_>) -> schemagate_migrate::Result<()> {
        ctx.drop_table("Posts").await?;
        ctx.drop_table("Users").await
    }
}
