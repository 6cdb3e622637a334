use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;

use crate::{
    entity::prelude::*,
    ids::{SubscriptionId, UserId},
    subject::Subject,
};

/// Subscribes `user_id` to `subject`. Subscribing twice is a no-op.
pub async fn subscribe<C>(
    db: &C,
    user_id: UserId,
    subject: Subject,
    now: DateTime<Utc>,
) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    let subscription = CommentSubscriptionActiveModel {
        id: Set(SubscriptionId::new()),
        user_id: Set(user_id),
        subscribable_type: Set(subject.kind()),
        subscribable_id: Set(subject.raw_id()),
        created_at: Set(now),
    };

    CommentSubscription::insert(subscription)
        .on_conflict(
            OnConflict::columns([
                CommentSubscriptionColumn::UserId,
                CommentSubscriptionColumn::SubscribableType,
                CommentSubscriptionColumn::SubscribableId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Returns whether there was a subscription to remove.
pub async fn unsubscribe<C>(db: &C, user_id: UserId, subject: Subject) -> Result<bool, DbErr>
where
    C: ConnectionTrait,
{
    let result = CommentSubscription::delete_many()
        .filter(CommentSubscriptionColumn::UserId.eq(user_id))
        .filter(CommentSubscriptionColumn::SubscribableType.eq(subject.kind()))
        .filter(CommentSubscriptionColumn::SubscribableId.eq(subject.raw_id()))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

pub async fn is_subscribed<C>(db: &C, user_id: UserId, subject: Subject) -> Result<bool, DbErr>
where
    C: ConnectionTrait,
{
    let count = CommentSubscription::find()
        .filter(CommentSubscriptionColumn::UserId.eq(user_id))
        .filter(CommentSubscriptionColumn::SubscribableType.eq(subject.kind()))
        .filter(CommentSubscriptionColumn::SubscribableId.eq(subject.raw_id()))
        .count(db)
        .await?;
    Ok(count > 0)
}

/// Everyone subscribed to `subject`, in subscription order.
pub async fn subscribers<C>(db: &C, subject: Subject) -> Result<Vec<UserId>, DbErr>
where
    C: ConnectionTrait,
{
    let subscriptions = CommentSubscription::find()
        .filter(CommentSubscriptionColumn::SubscribableType.eq(subject.kind()))
        .filter(CommentSubscriptionColumn::SubscribableId.eq(subject.raw_id()))
        .order_by_asc(CommentSubscriptionColumn::Id)
        .all(db)
        .await?;

    Ok(subscriptions
        .into_iter()
        .map(|subscription| subscription.user_id)
        .collect())
}
