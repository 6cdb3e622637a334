use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    actor::Role,
    clock::Clock,
    config::CommentsConfig,
    directory::Directory,
    entity::prelude::CommentModel,
    error::CommentError,
    events::EventBus,
    ids::CommentId,
    models::comments as store,
    policy::CommentContext,
    subject::SubjectInfo,
};

pub mod comments;
pub mod moderation;
pub mod notifications;

pub use comments::CommentsService;
pub use moderation::ModerationService;
pub use notifications::Notifier;

/// Handles every service shares.
#[derive(Clone)]
pub struct ServiceContext {
    pub db: DatabaseConnection,
    pub config: Arc<CommentsConfig>,
    pub directory: Arc<dyn Directory>,
    pub clock: Arc<dyn Clock>,
    pub events: EventBus,
}

/// A comment plus what the policy needs to judge it.
#[derive(Debug, Clone)]
pub struct LoadedComment {
    pub comment: CommentModel,
    pub subject: SubjectInfo,
    pub author_role: Role,
    pub deleter_role: Option<Role>,
}

impl LoadedComment {
    pub fn policy_context(&self) -> CommentContext<'_> {
        CommentContext {
            comment: &self.comment,
            subject: &self.subject,
            author_role: self.author_role,
            deleter_role: self.deleter_role,
        }
    }
}

impl ServiceContext {
    pub(crate) async fn load_comment(&self, id: CommentId) -> Result<LoadedComment, CommentError> {
        let comment = store::find(&self.db, id)
            .await?
            .ok_or(CommentError::NotFound("comment"))?;
        self.load_context(comment).await
    }

    pub(crate) async fn load_context(
        &self,
        comment: CommentModel,
    ) -> Result<LoadedComment, CommentError> {
        // a comment on a subject that no longer exists is gone too
        let subject = self
            .directory
            .subject(comment.subject())
            .await
            .ok_or(CommentError::NotFound("comment"))?;

        let author_role = self.directory.role_of(comment.user_id).await;
        let deleter_role = match comment.deleted_by {
            Some(deleted_by) => Some(self.directory.role_of(deleted_by).await),
            None => None,
        };

        Ok(LoadedComment {
            comment,
            subject,
            author_role,
            deleter_role,
        })
    }
}
