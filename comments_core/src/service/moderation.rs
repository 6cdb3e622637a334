use chrono::Duration;
use sea_orm::sea_query::Expr;
use tracing::info;

use crate::{
    actor::Actor,
    entity::prelude::*,
    error::CommentError,
    events::CommentEvent,
    ids::CommentId,
    models::comments as store,
    policy::{self, Action},
    service::ServiceContext,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The comment (and any already-deleted replies under it) is gone.
    HardDeleted,
    /// The comment stays in place as a placeholder.
    SoftDeleted,
}

#[derive(Clone)]
pub struct ModerationService {
    ctx: ServiceContext,
}

impl ModerationService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Deletes a comment. Young comments nobody has replied to (or whose
    /// replies are all deleted) are removed outright, everything else is
    /// soft-deleted so the thread stays readable.
    pub async fn delete(
        &self,
        actor: &Actor,
        comment_id: CommentId,
    ) -> Result<DeleteOutcome, CommentError> {
        let loaded = self.ctx.load_comment(comment_id).await?;
        if !policy::can_act(Some(actor), &loaded.policy_context(), Action::SoftDelete) {
            return Err(CommentError::Forbidden);
        }

        let comment = loaded.comment;
        let subject = comment.subject();
        let now = self.ctx.clock.now();
        let window =
            Duration::seconds(self.ctx.config.moderation.hard_delete_window_secs as i64);
        let young = now - comment.created_at < window;

        let txn = self.ctx.db.begin().await?;

        if young && store::surviving_descendants(&txn, &comment).await? == 0 {
            let removed = store::hard_delete_subtree(&txn, comment).await?;
            txn.commit().await?;

            info!(%comment_id, actor_id = %actor.id, removed = removed.len(), "comment hard-deleted");
            self.ctx.events.publish(CommentEvent::HardDeleted {
                comment_ids: removed,
                subject,
            });
            return Ok(DeleteOutcome::HardDeleted);
        }

        if !store::soft_delete(&txn, comment_id, actor.id, now).await? {
            return Err(CommentError::Forbidden);
        }
        txn.commit().await?;

        info!(%comment_id, actor_id = %actor.id, "comment soft-deleted");
        self.ctx.events.publish(CommentEvent::SoftDeleted {
            comment_id,
            subject,
        });
        Ok(DeleteOutcome::SoftDeleted)
    }

    /// Removes a comment and everything under it regardless of age or
    /// replies. Administrators only.
    pub async fn hard_delete_thread(
        &self,
        actor: &Actor,
        comment_id: CommentId,
    ) -> Result<Vec<CommentId>, CommentError> {
        if !actor.role.is_administrator() {
            return Err(CommentError::Forbidden);
        }

        let loaded = self.ctx.load_comment(comment_id).await?;
        if !policy::can_act(Some(actor), &loaded.policy_context(), Action::HardDeleteThread) {
            return Err(CommentError::Forbidden);
        }

        let subject = loaded.comment.subject();
        let txn = self.ctx.db.begin().await?;
        let removed = store::hard_delete_subtree(&txn, loaded.comment).await?;
        txn.commit().await?;

        info!(%comment_id, actor_id = %actor.id, removed = removed.len(), "thread hard-deleted");
        self.ctx.events.publish(CommentEvent::HardDeleted {
            comment_ids: removed.clone(),
            subject,
        });
        Ok(removed)
    }

    pub async fn restore(
        &self,
        actor: &Actor,
        comment_id: CommentId,
    ) -> Result<CommentModel, CommentError> {
        let loaded = self.ctx.load_comment(comment_id).await?;
        if !policy::can_act(Some(actor), &loaded.policy_context(), Action::Restore) {
            return Err(CommentError::Forbidden);
        }

        if !store::restore(&self.ctx.db, comment_id).await? {
            return Err(CommentError::Forbidden);
        }

        info!(%comment_id, actor_id = %actor.id, "comment restored");
        self.ctx.events.publish(CommentEvent::Restored {
            comment_id,
            subject: loaded.comment.subject(),
        });

        store::find(&self.ctx.db, comment_id)
            .await?
            .ok_or(CommentError::NotFound("comment"))
    }

    /// Pins or unpins a top-level comment.
    pub async fn pin(
        &self,
        actor: &Actor,
        comment_id: CommentId,
        pinned: bool,
    ) -> Result<CommentModel, CommentError> {
        let loaded = self.ctx.load_comment(comment_id).await?;
        if !policy::can_act(Some(actor), &loaded.policy_context(), Action::Pin) {
            return Err(CommentError::Forbidden);
        }

        Comment::update_many()
            .col_expr(CommentColumn::Pinned, Expr::value(pinned))
            .filter(CommentColumn::Id.eq(comment_id))
            .exec(&self.ctx.db)
            .await?;

        info!(%comment_id, actor_id = %actor.id, pinned, "comment pin changed");
        self.ctx.events.publish(CommentEvent::PinChanged {
            comment_id,
            subject: loaded.comment.subject(),
            pinned,
        });

        store::find(&self.ctx.db, comment_id)
            .await?
            .ok_or(CommentError::NotFound("comment"))
    }
}
