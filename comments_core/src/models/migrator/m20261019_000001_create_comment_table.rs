use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Comment::Table)
                    .col(pk_uuid(Comment::Id))
                    .col(string_len(Comment::CommentableType, 16))
                    .col(uuid(Comment::CommentableId))
                    .col(uuid(Comment::UserId))
                    .col(uuid_null(Comment::ParentId))
                    .col(uuid_null(Comment::RootId))
                    .col(boolean(Comment::Pinned).default(false))
                    .col(timestamp_with_time_zone(Comment::CreatedAt))
                    .col(timestamp_with_time_zone_null(Comment::EditedAt))
                    .col(timestamp_with_time_zone_null(Comment::DeletedAt))
                    .col(uuid_null(Comment::DeletedBy))
                    .col(string_len(Comment::SpamStatus, 16))
                    .col(timestamp_with_time_zone_null(Comment::SpamCheckedAt))
                    .col(integer(Comment::SpamRecheckCount).default(0))
                    .col(json_null(Comment::SpamMetadata))
                    // A parent (or thread root) can never be removed from under
                    // a surviving reply.
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-comment-parent_id")
                            .from(Comment::Table, Comment::ParentId)
                            .to(Comment::Table, Comment::Id)
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-comment-root_id")
                            .from(Comment::Table, Comment::RootId)
                            .to(Comment::Table, Comment::Id)
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_comments_subject")
                    .table(Comment::Table)
                    .col(Comment::CommentableType)
                    .col(Comment::CommentableId)
                    .col(Comment::ParentId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_comments_root_id")
                    .table(Comment::Table)
                    .col(Comment::RootId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_comments_parent_id")
                    .table(Comment::Table)
                    .col(Comment::ParentId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_comments_user_id")
                    .table(Comment::Table)
                    .col(Comment::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Comment::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Comment {
    Table,
    Id,
    CommentableType,
    CommentableId,
    UserId,
    ParentId,
    RootId,
    Pinned,
    CreatedAt,
    EditedAt,
    DeletedAt,
    DeletedBy,
    SpamStatus,
    SpamCheckedAt,
    SpamRecheckCount,
    SpamMetadata,
}
