use crate::ids::{CommentId, UserId};
use crate::subject::{Subject, SubjectKind};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum SpamStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "clean")]
    Clean,
    #[sea_orm(string_value = "spam")]
    Spam,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "comment")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: CommentId,
    pub commentable_type: SubjectKind,
    pub commentable_id: Uuid,
    pub user_id: UserId,
    pub parent_id: Option<CommentId>, // NULL for root comments
    pub root_id: Option<CommentId>,   // NULL iff parent_id is NULL
    pub pinned: bool,
    pub created_at: DateTimeUtc,
    pub edited_at: Option<DateTimeUtc>,
    pub deleted_at: Option<DateTimeUtc>,
    pub deleted_by: Option<UserId>,
    pub spam_status: SpamStatus,
    pub spam_checked_at: Option<DateTimeUtc>,
    pub spam_recheck_count: i32,
    #[sea_orm(column_type = "Json", nullable)]
    pub spam_metadata: Option<Json>,
}

impl Model {
    pub fn subject(&self) -> Subject {
        Subject::from_parts(self.commentable_type, self.commentable_id)
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// The id of the thread this comment belongs to.
    pub fn thread_id(&self) -> CommentId {
        self.root_id.unwrap_or(self.id)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ParentId",
        to = "Column::Id"
    )]
    Parent,
    #[sea_orm(has_many = "super::comment_version::Entity")]
    CommentVersion,
    #[sea_orm(has_many = "super::comment_reaction::Entity")]
    CommentReaction,
}

impl Related<super::comment_version::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CommentVersion.def()
    }
}

impl Related<super::comment_reaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CommentReaction.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
