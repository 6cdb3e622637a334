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
                    .table(CommentVersion::Table)
                    .col(pk_uuid(CommentVersion::Id))
                    .col(uuid(CommentVersion::CommentId))
                    .col(integer(CommentVersion::VersionNumber))
                    .col(text(CommentVersion::Body))
                    .col(timestamp_with_time_zone(CommentVersion::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-comment-version-comment_id")
                            .from(CommentVersion::Table, CommentVersion::CommentId)
                            .to(Comment::Table, Comment::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Two edits can never share a version number
        manager
            .create_index(
                Index::create()
                    .name("idx_comment_versions_comment_number_unique")
                    .table(CommentVersion::Table)
                    .col(CommentVersion::CommentId)
                    .col(CommentVersion::VersionNumber)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CommentVersion::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum CommentVersion {
    Table,
    Id,
    CommentId,
    VersionNumber,
    Body,
    CreatedAt,
}
