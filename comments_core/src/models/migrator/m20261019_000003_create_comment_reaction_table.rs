use sea_orm_migration::{prelude::*, schema::*};

use super::m20261019_000001_create_comment_table::Comment;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CommentReaction::Table)
                    .col(pk_uuid(CommentReaction::Id))
                    .col(uuid(CommentReaction::CommentId))
                    .col(uuid(CommentReaction::UserId))
                    .col(timestamp_with_time_zone(CommentReaction::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-comment-reaction-comment_id")
                            .from(CommentReaction::Table, CommentReaction::CommentId)
                            .to(Comment::Table, Comment::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One like per user per comment
        manager
            .create_index(
                Index::create()
                    .name("idx_comment_reactions_comment_user_unique")
                    .table(CommentReaction::Table)
                    .col(CommentReaction::CommentId)
                    .col(CommentReaction::UserId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CommentReaction::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum CommentReaction {
    Table,
    Id,
    CommentId,
    UserId,
    CreatedAt,
}
