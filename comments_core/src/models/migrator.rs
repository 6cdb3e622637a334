use sea_orm_migration::prelude::*;

mod m20261019_000001_create_comment_table;
mod m20261019_000002_create_comment_version_table;
mod m20261019_000003_create_comment_reaction_table;
mod m20261019_000004_create_comment_subscription_table;
mod m20261019_000005_create_notification_log_table;
mod m20261019_000006_create_task_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261019_000001_create_comment_table::Migration),
            Box::new(m20261019_000002_create_comment_version_table::Migration),
            Box::new(m20261019_000003_create_comment_reaction_table::Migration),
            Box::new(m20261019_000004_create_comment_subscription_table::Migration),
            Box::new(m20261019_000005_create_notification_log_table::Migration),
            Box::new(m20261019_000006_create_task_table::Migration),
        ]
    }
}

#[cfg(test)]
use sea_orm::{Database, DbErr};

#[tokio::test]
async fn test_migrations_okay() -> Result<(), DbErr> {
    let db = Database::connect("sqlite::memory:").await?;
    let schema_manager = SchemaManager::new(&db);

    Migrator::refresh(&db).await?;

    assert!(schema_manager.has_table("comment").await?);
    assert!(schema_manager.has_table("comment_version").await?);
    assert!(schema_manager.has_table("comment_reaction").await?);
    assert!(schema_manager.has_table("comment_subscription").await?);
    assert!(schema_manager.has_table("notification_log").await?);
    assert!(schema_manager.has_table("task").await?);

    Ok(())
}
