use sea_orm::{Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;

use crate::config::CommentsConfig;

pub mod comments;
pub mod migrator;
pub mod notification_log;
pub mod reactions;
pub mod subscriptions;

pub async fn open_or_create_db(config: &CommentsConfig) -> Result<DatabaseConnection, DbErr> {
    let connection_string = format!("sqlite://{}?mode=rwc", config.database_path.display());

    Database::connect(&connection_string).await
}

pub async fn migrate_up(db: &DatabaseConnection) -> Result<(), DbErr> {
    migrator::Migrator::up(db, None).await
}
