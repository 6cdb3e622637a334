use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;

use crate::{
    entity::prelude::*,
    ids::{CommentId, NotificationLogId, UserId},
};

/// Reserves the (user, comment, class) slot before anything is sent.
/// `None` means someone already holds it, i.e. it was already sent.
pub async fn claim<C>(
    db: &C,
    user_id: UserId,
    comment_id: CommentId,
    class: NotificationClass,
    scope: DeliveryScope,
    now: DateTime<Utc>,
) -> Result<Option<NotificationLogId>, DbErr>
where
    C: ConnectionTrait,
{
    let id = NotificationLogId::new();
    let entry = NotificationLogActiveModel {
        id: Set(id),
        user_id: Set(user_id),
        notifiable_id: Set(comment_id),
        notification_class: Set(class),
        notification_type: Set(scope),
        created_at: Set(now),
    };

    let inserted = NotificationLog::insert(entry)
        .on_conflict(
            OnConflict::columns([
                NotificationLogColumn::UserId,
                NotificationLogColumn::NotifiableId,
                NotificationLogColumn::NotificationClass,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    Ok((inserted > 0).then_some(id))
}

/// Gives a claim back after a failed delivery so a retry can send it.
pub async fn release<C>(db: &C, id: NotificationLogId) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    NotificationLog::delete_by_id(id).exec(db).await?;
    Ok(())
}

pub async fn entries_for<C>(db: &C, comment_id: CommentId) -> Result<Vec<NotificationLogModel>, DbErr>
where
    C: ConnectionTrait,
{
    NotificationLog::find()
        .filter(NotificationLogColumn::NotifiableId.eq(comment_id))
        .order_by_asc(NotificationLogColumn::Id)
        .all(db)
        .await
}
