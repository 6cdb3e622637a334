use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Task::Table)
                    .col(pk_uuid(Task::Id))
                    .col(string_len(Task::Kind, 16))
                    .col(uuid(Task::CommentId))
                    .col(json_null(Task::Payload))
                    .col(timestamp_with_time_zone(Task::RunAt))
                    .col(string_len(Task::Status, 16))
                    .col(integer(Task::Attempts).default(0))
                    .col(integer(Task::MaxAttempts))
                    .col(text_null(Task::LastError))
                    .col(timestamp_with_time_zone(Task::CreatedAt))
                    .col(timestamp_with_time_zone(Task::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        // Claiming scans pending tasks by due time
        manager
            .create_index(
                Index::create()
                    .name("idx_tasks_status_run_at")
                    .table(Task::Table)
                    .col(Task::Status)
                    .col(Task::RunAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tasks_comment_id")
                    .table(Task::Table)
                    .col(Task::CommentId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Task::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Task {
    Table,
    Id,
    Kind,
    CommentId,
    Payload,
    RunAt,
    Status,
    Attempts,
    MaxAttempts,
    LastError,
    CreatedAt,
    UpdatedAt,
}
