//! Every forum migration, oldest first.
//!
//! New files come from `forum-migrate generate`; add their `MIGRATION`
//! constant to [`all`].

use schemagate_migrate::migration::{Migration, MigrationSet};

mod m20260101t000000_create_users_and_posts;
mod m20260215t093000_add_comments;
mod m20261018t120000_add_user_email;

/// The forum's migration set.
///
/// # Errors
///
/// Fails if two migrations share a name.
pub fn all() -> schemagate_migrate::Result<MigrationSet> {
    let migrations: Vec<Box<dyn Migration>> = vec![
        Box::new(m20260101t000000_create_users_and_posts::CreateUsersAndPosts),
        Box::new(m20260215t093000_add_comments::AddComments),
        Box::new(m20261018t120000_add_user_email::MIGRATION),
    ];
    MigrationSet::new(migrations)
}
