// SeaORM entities for the comment store and its background work queue.

pub mod comment;
pub mod comment_reaction;
pub mod comment_subscription;
pub mod comment_version;
pub mod notification_log;
pub mod task;


pub mod prelude {
    // Re-export all entities for convenience
    pub use super::comment::{
        ActiveModel as CommentActiveModel, Column as CommentColumn, Entity as Comment,
        Model as CommentModel, SpamStatus,
    };
    pub use super::comment_reaction::{
        ActiveModel as CommentReactionActiveModel, Column as CommentReactionColumn,
        Entity as CommentReaction, Model as CommentReactionModel,
    };
    pub use super::comment_subscription::{
        ActiveModel as CommentSubscriptionActiveModel, Column as CommentSubscriptionColumn,
        Entity as CommentSubscription, Model as CommentSubscriptionModel,
    };
    pub use super::comment_version::{
        ActiveModel as CommentVersionActiveModel, Column as CommentVersionColumn,
        Entity as CommentVersion, Model as CommentVersionModel,
    };
    pub use super::notification_log::{
        ActiveModel as NotificationLogActiveModel, Column as NotificationLogColumn,
        DeliveryScope, Entity as NotificationLog, Model as NotificationLogModel,
        NotificationClass,
    };
    pub use super::task::{
        ActiveModel as TaskActiveModel, Column as TaskColumn, Entity as Task,
        Model as TaskModel, TaskKind, TaskStatus,
    };

    // Re-export commonly used SeaORM types and traits
    pub use sea_orm::{
        ActiveModelTrait,
        ActiveValue,

        ColumnTrait,
        ConnectionTrait,

        // Database and connection types
        Database,
        DatabaseConnection,
        DatabaseTransaction,
        DbConn,
        DbErr,

        // Core traits
        EntityTrait,
        ModelTrait,
        NotSet,
        PaginatorTrait,
        QueryFilter,
        QueryOrder,
        QuerySelect,
        Related,

        // Active model helpers
        Set,
        TransactionTrait,
    };
}
