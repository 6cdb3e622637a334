use crate::ids::{CommentId, NotificationLogId, UserId};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum NotificationClass {
    #[sea_orm(string_value = "new_comment")]
    NewComment,
    #[sea_orm(string_value = "comment_reply")]
    CommentReply,
}

/// Which channels a logged notification went out on. `All` is database
/// plus mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum DeliveryScope {
    #[sea_orm(string_value = "database")]
    Database,
    #[sea_orm(string_value = "all")]
    All,
}

/// Idempotency ledger, unique on (user_id, notifiable_id, notification_class).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification_log")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: NotificationLogId,
    pub user_id: UserId,
    pub notifiable_id: CommentId,
    pub notification_class: NotificationClass,
    pub notification_type: DeliveryScope,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
