use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CommentSubscription::Table)
                    .col(pk_uuid(CommentSubscription::Id))
                    .col(uuid(CommentSubscription::UserId))
                    .col(string_len(CommentSubscription::SubscribableType, 16))
                    .col(uuid(CommentSubscription::SubscribableId))
                    .col(timestamp_with_time_zone(CommentSubscription::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_comment_subscriptions_user_subject_unique")
                    .table(CommentSubscription::Table)
                    .col(CommentSubscription::UserId)
                    .col(CommentSubscription::SubscribableType)
                    .col(CommentSubscription::SubscribableId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Fan-out looks subscribers up by subject
        manager
            .create_index(
                Index::create()
                    .name("idx_comment_subscriptions_subject")
                    .table(CommentSubscription::Table)
                    .col(CommentSubscription::SubscribableType)
                    .col(CommentSubscription::SubscribableId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CommentSubscription::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum CommentSubscription {
    Table,
    Id,
    UserId,
    SubscribableType,
    SubscribableId,
    CreatedAt,
}
