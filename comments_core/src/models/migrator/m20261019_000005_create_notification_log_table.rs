use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(NotificationLog::Table)
                    .col(pk_uuid(NotificationLog::Id))
                    .col(uuid(NotificationLog::UserId))
                    .col(uuid(NotificationLog::NotifiableId))
                    .col(string_len(NotificationLog::NotificationClass, 32))
                    .col(string_len(NotificationLog::NotificationType, 16))
                    .col(timestamp_with_time_zone(NotificationLog::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // Deduplication key for notification dispatch
        manager
            .create_index(
                Index::create()
                    .name("idx_notification_logs_dedup_unique")
                    .table(NotificationLog::Table)
                    .col(NotificationLog::UserId)
                    .col(NotificationLog::NotifiableId)
                    .col(NotificationLog::NotificationClass)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(NotificationLog::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum NotificationLog {
    Table,
    Id,
    UserId,
    NotifiableId,
    NotificationClass,
    NotificationType,
    CreatedAt,
}
