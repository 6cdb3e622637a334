use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::{
    entity::prelude::*,
    ids::{CommentId, ReactionId, UserId},
};

/// Likes if not yet liked, unlikes otherwise. Returns whether the user likes
/// the comment afterwards. Callers serialize per (comment, user).
pub async fn toggle<C>(
    db: &C,
    comment_id: CommentId,
    user_id: UserId,
    now: DateTime<Utc>,
) -> Result<bool, DbErr>
where
    C: ConnectionTrait,
{
    let existing = CommentReaction::find()
        .filter(CommentReactionColumn::CommentId.eq(comment_id))
        .filter(CommentReactionColumn::UserId.eq(user_id))
        .one(db)
        .await?;

    match existing {
        Some(reaction) => {
            CommentReaction::delete_by_id(reaction.id).exec(db).await?;
            Ok(false)
        }
        None => {
            let reaction = CommentReactionActiveModel {
                id: Set(ReactionId::new()),
                comment_id: Set(comment_id),
                user_id: Set(user_id),
                created_at: Set(now),
            };
            CommentReaction::insert(reaction).exec(db).await?;
            Ok(true)
        }
    }
}

pub async fn count<C>(db: &C, comment_id: CommentId) -> Result<u64, DbErr>
where
    C: ConnectionTrait,
{
    CommentReaction::find()
        .filter(CommentReactionColumn::CommentId.eq(comment_id))
        .count(db)
        .await
}

/// Like count for a comment and whether the viewer is among the likers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReactionSummary {
    pub count: u64,
    pub liked: bool,
}

/// Reaction summaries for a page of comments in one query. Comments nobody
/// liked are absent from the map.
pub async fn summaries<C>(
    db: &C,
    comment_ids: &[CommentId],
    viewer: Option<UserId>,
) -> Result<HashMap<CommentId, ReactionSummary>, DbErr>
where
    C: ConnectionTrait,
{
    if comment_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let reactions = CommentReaction::find()
        .filter(CommentReactionColumn::CommentId.is_in(comment_ids.iter().copied()))
        .all(db)
        .await?;

    let mut summaries: HashMap<CommentId, ReactionSummary> = HashMap::new();
    for reaction in reactions {
        let summary = summaries.entry(reaction.comment_id).or_default();
        summary.count += 1;
        summary.liked |= viewer == Some(reaction.user_id);
    }
    Ok(summaries)
}
