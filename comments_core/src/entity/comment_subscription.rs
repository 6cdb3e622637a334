use crate::ids::{SubscriptionId, UserId};
use crate::subject::{Subject, SubjectKind};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Explicit opt-in to hear about new comments on a subject.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "comment_subscription")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub subscribable_type: SubjectKind,
    pub subscribable_id: Uuid,
    pub created_at: DateTimeUtc,
}

impl Model {
    pub fn subject(&self) -> Subject {
        Subject::from_parts(self.subscribable_type, self.subscribable_id)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
