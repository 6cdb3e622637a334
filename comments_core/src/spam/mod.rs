//! Spam classification state machine.
//!
//! Every comment starts `pending`. A background check moves it to `clean`
//! or `spam`; moderators can flip it by hand or send it back to `pending`
//! for another look. The classifier is allowed to fail, and when it does
//! the comment is published (fail open) with the failure noted in its
//! metadata.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    actor::{Actor, RequestContext},
    config::SpamConfig,
    entity::prelude::*,
    error::CommentError,
    events::CommentEvent,
    ids::{CommentId, UserId},
    models::comments as store,
    policy::{self, Action},
    queue,
    service::ServiceContext,
};

pub mod classifier;
pub mod http;

pub use classifier::{
    CheckRequest, ClassifierError, DisabledClassifier, SpamClassifier, UsageLimit, Verdict,
};
pub use http::HttpClassifier;

pub const REASON_CLASSIFIER_DISABLED: &str = "classifier_disabled";
pub const ERROR_INVALID_API_KEY: &str = "invalid_api_key";
pub const ERROR_CLASSIFIER_UNAVAILABLE: &str = "classifier_unavailable";

/// Builds the classifier described by the config, or the disabled one.
pub fn classifier_from_config(config: &SpamConfig) -> Arc<dyn SpamClassifier> {
    if !config.enabled {
        return Arc::new(DisabledClassifier);
    }

    match HttpClassifier::new(config) {
        Ok(classifier) => Arc::new(classifier),
        Err(error) => {
            warn!(%error, "spam classifier enabled but not usable, checks disabled");
            Arc::new(DisabledClassifier)
        }
    }
}

/// Audit trail stored in `comment.spam_metadata`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpamMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub discarded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub manually_marked: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub manually_approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marked_at: Option<DateTime<Utc>>,
}

impl SpamMetadata {
    pub fn of(comment: &CommentModel) -> Result<Self, serde_json::Error> {
        match &comment.spam_metadata {
            Some(value) => serde_json::from_value(value.clone()),
            None => Ok(Self::default()),
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Turns a classifier answer into the status to store. Errors never block
/// a comment.
pub fn outcome(
    result: Result<Verdict, ClassifierError>,
    checked_at: DateTime<Utc>,
) -> (SpamStatus, SpamMetadata) {
    let mut metadata = SpamMetadata {
        checked_at: Some(checked_at),
        ..SpamMetadata::default()
    };

    let status = match result {
        Ok(verdict) => {
            metadata.api_version = Some(verdict.api_version);
            if verdict.spam {
                metadata.discarded = verdict.discard;
                SpamStatus::Spam
            } else {
                SpamStatus::Clean
            }
        }
        Err(ClassifierError::Disabled) => {
            metadata.reason = Some(REASON_CLASSIFIER_DISABLED.to_string());
            SpamStatus::Clean
        }
        Err(ClassifierError::InvalidKey) => {
            metadata.error = Some(ERROR_INVALID_API_KEY.to_string());
            SpamStatus::Clean
        }
        Err(ClassifierError::Unavailable(_) | ClassifierError::Timeout) => {
            metadata.error = Some(ERROR_CLASSIFIER_UNAVAILABLE.to_string());
            SpamStatus::Clean
        }
    };

    (status, metadata)
}

#[derive(Clone)]
pub struct SpamEngine {
    ctx: ServiceContext,
    classifier: Arc<dyn SpamClassifier>,
}

impl SpamEngine {
    pub fn new(ctx: ServiceContext, classifier: Arc<dyn SpamClassifier>) -> Self {
        Self { ctx, classifier }
    }

    /// Background check of a pending comment. Returns the status it settled
    /// on, or `None` when there was nothing to do.
    pub async fn classify(
        &self,
        comment_id: CommentId,
        request: &RequestContext,
    ) -> Result<Option<SpamStatus>, CommentError> {
        let Some(comment) = store::find(&self.ctx.db, comment_id).await? else {
            debug!(%comment_id, "comment gone before spam check");
            return Ok(None);
        };
        if comment.spam_status != SpamStatus::Pending {
            debug!(%comment_id, status = ?comment.spam_status, "spam check already settled");
            return Ok(None);
        }

        let check = self.check_request(&comment, request).await?;
        // a rejected key fails every check, so skip the round trip
        let result = match self.classifier.verify_key().await {
            Ok(false) => Err(ClassifierError::InvalidKey),
            Err(ClassifierError::Disabled) => Err(ClassifierError::Disabled),
            _ => self.classifier.check(&check).await,
        };
        if let Err(error) = &result {
            match error {
                ClassifierError::Disabled => debug!(%comment_id, "spam check skipped, classifier disabled"),
                _ => warn!(%comment_id, %error, "spam check failed, publishing comment"),
            }
        }

        let (status, metadata) = outcome(result, self.ctx.clock.now());
        self.settle(&comment, status, metadata).await
    }

    /// Publishes a comment whose spam check gave up for good, so a broken
    /// classifier or queue never keeps it hidden.
    pub async fn fail_open(
        &self,
        comment_id: CommentId,
        reason: &str,
    ) -> Result<Option<SpamStatus>, CommentError> {
        let Some(comment) = store::find(&self.ctx.db, comment_id).await? else {
            return Ok(None);
        };
        if comment.spam_status != SpamStatus::Pending {
            return Ok(None);
        }

        warn!(%comment_id, %reason, "spam check abandoned, publishing comment");
        let failure = Err(ClassifierError::Unavailable(reason.to_string()));
        let (status, metadata) = outcome(failure, self.ctx.clock.now());
        self.settle(&comment, status, metadata).await
    }

    /// Moves a pending comment to `status`. A moderator may have decided
    /// while we were waiting, in which case their decision stays.
    async fn settle(
        &self,
        comment: &CommentModel,
        status: SpamStatus,
        metadata: SpamMetadata,
    ) -> Result<Option<SpamStatus>, CommentError> {
        let comment_id = comment.id;
        let checked_at = metadata.checked_at;

        let update = Comment::update_many()
            .col_expr(CommentColumn::SpamStatus, Expr::value(status))
            .col_expr(CommentColumn::SpamCheckedAt, Expr::value(checked_at))
            .col_expr(CommentColumn::SpamMetadata, Expr::value(metadata.to_json()?))
            .filter(CommentColumn::Id.eq(comment_id))
            .filter(CommentColumn::SpamStatus.eq(SpamStatus::Pending))
            .exec(&self.ctx.db)
            .await?;
        if update.rows_affected == 0 {
            debug!(%comment_id, "spam status changed during check, keeping it");
            return Ok(None);
        }

        info!(%comment_id, ?status, discarded = metadata.discarded, "comment classified");
        self.ctx.events.publish(CommentEvent::SpamStatusChanged {
            comment_id,
            subject: comment.subject(),
            status,
        });
        Ok(Some(status))
    }

    /// Sends a comment back through the classifier. Limited to a configured
    /// number of rechecks per comment.
    pub async fn recheck(
        &self,
        actor: &Actor,
        comment_id: CommentId,
        request: &RequestContext,
    ) -> Result<(), CommentError> {
        let loaded = self.ctx.load_comment(comment_id).await?;
        if !policy::can_act(Some(actor), &loaded.policy_context(), Action::Recheck) {
            return Err(CommentError::Forbidden);
        }

        let now = self.ctx.clock.now();
        let ceiling = self.ctx.config.moderation.max_spam_rechecks;

        let txn = self.ctx.db.begin().await?;
        let result = Comment::update_many()
            .col_expr(
                CommentColumn::SpamRecheckCount,
                Expr::col(CommentColumn::SpamRecheckCount).add(1),
            )
            .col_expr(CommentColumn::SpamStatus, Expr::value(SpamStatus::Pending))
            .filter(CommentColumn::Id.eq(comment_id))
            .filter(CommentColumn::SpamRecheckCount.lt(ceiling))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            debug!(%comment_id, ceiling, "recheck ceiling reached");
            return Err(CommentError::Forbidden);
        }

        queue::enqueue(
            &txn,
            TaskKind::SpamCheck,
            comment_id,
            Some(request),
            now,
            self.ctx.config.worker.max_attempts,
            now,
        )
        .await?;
        txn.commit().await?;

        info!(%comment_id, actor_id = %actor.id, "spam recheck requested");
        self.ctx.events.publish(CommentEvent::SpamStatusChanged {
            comment_id,
            subject: loaded.comment.subject(),
            status: SpamStatus::Pending,
        });
        Ok(())
    }

    pub async fn mark_as_spam(
        &self,
        actor: &Actor,
        comment_id: CommentId,
    ) -> Result<CommentModel, CommentError> {
        self.mark(actor, comment_id, SpamStatus::Spam).await
    }

    pub async fn mark_as_ham(
        &self,
        actor: &Actor,
        comment_id: CommentId,
    ) -> Result<CommentModel, CommentError> {
        self.mark(actor, comment_id, SpamStatus::Clean).await
    }

    async fn mark(
        &self,
        actor: &Actor,
        comment_id: CommentId,
        target: SpamStatus,
    ) -> Result<CommentModel, CommentError> {
        let action = match target {
            SpamStatus::Spam => Action::MarkSpam,
            _ => Action::MarkClean,
        };

        let loaded = self.ctx.load_comment(comment_id).await?;
        if !policy::can_act(Some(actor), &loaded.policy_context(), action) {
            return Err(CommentError::Forbidden);
        }
        if loaded.comment.spam_status == target {
            return Err(CommentError::Forbidden);
        }

        let now = self.ctx.clock.now();
        let mut metadata = SpamMetadata::of(&loaded.comment)?;
        metadata.manually_marked = target == SpamStatus::Spam;
        metadata.manually_approved = target == SpamStatus::Clean;
        metadata.actor_id = Some(actor.id);
        metadata.marked_at = Some(now);

        // only one of two racing clicks gets to flip it
        let result = Comment::update_many()
            .col_expr(CommentColumn::SpamStatus, Expr::value(target))
            .col_expr(CommentColumn::SpamMetadata, Expr::value(metadata.to_json()?))
            .filter(CommentColumn::Id.eq(comment_id))
            .filter(CommentColumn::SpamStatus.ne(target))
            .exec(&self.ctx.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(CommentError::Forbidden);
        }

        info!(%comment_id, actor_id = %actor.id, status = ?target, "spam status set by hand");
        self.send_feedback(&loaded.comment, target).await?;

        self.ctx.events.publish(CommentEvent::SpamStatusChanged {
            comment_id,
            subject: loaded.comment.subject(),
            status: target,
        });

        store::find(&self.ctx.db, comment_id)
            .await?
            .ok_or(CommentError::NotFound("comment"))
    }

    /// Current status for pollers waiting on a fresh comment.
    pub async fn check_status(
        &self,
        actor: Option<&Actor>,
        comment_id: CommentId,
    ) -> Result<(SpamStatus, Option<DateTime<Utc>>), CommentError> {
        let loaded = self.ctx.load_comment(comment_id).await?;
        if !policy::can_view(actor, &loaded.policy_context()) {
            return Err(CommentError::NotFound("comment"));
        }
        Ok((loaded.comment.spam_status, loaded.comment.spam_checked_at))
    }

    /// The classifier account's usage, `None` when it cannot be fetched.
    pub async fn usage_limit(&self, actor: &Actor) -> Result<Option<UsageLimit>, CommentError> {
        if !actor.role.is_moderator_tier() {
            return Err(CommentError::Forbidden);
        }

        match self.classifier.usage_limit().await {
            Ok(usage) => Ok(Some(usage)),
            Err(error) => {
                warn!(%error, "failed to fetch classifier usage");
                Ok(None)
            }
        }
    }

    async fn send_feedback(
        &self,
        comment: &CommentModel,
        target: SpamStatus,
    ) -> Result<(), CommentError> {
        // replay the original request context if we still have it
        let request = queue::tasks_for(&self.ctx.db, comment.id)
            .await?
            .into_iter()
            .rev()
            .find(|task| task.kind == TaskKind::SpamCheck)
            .map(|task| queue::decode_payload::<RequestContext>(&task))
            .transpose()?
            .flatten()
            .unwrap_or_default();

        let check = self.check_request(comment, &request).await?;
        let classifier = self.classifier.clone();
        let comment_id = comment.id;

        tokio::spawn(async move {
            let result = match target {
                SpamStatus::Spam => classifier.submit_spam(&check).await,
                _ => classifier.submit_ham(&check).await,
            };
            match result {
                Ok(()) => debug!(%comment_id, "classifier feedback sent"),
                Err(ClassifierError::Disabled) => {}
                Err(error) => warn!(%comment_id, %error, "classifier feedback failed"),
            }
        });
        Ok(())
    }

    async fn check_request(
        &self,
        comment: &CommentModel,
        request: &RequestContext,
    ) -> Result<CheckRequest, CommentError> {
        let body = store::current_body(&self.ctx.db, comment.id)
            .await?
            .unwrap_or_default();
        let author = self.ctx.directory.user(comment.user_id).await;

        Ok(CheckRequest {
            body,
            author_name: author
                .as_ref()
                .map(|user| user.display_name.clone())
                .unwrap_or_default(),
            author_email: author.and_then(|user| user.email),
            user_ip: request.ip.clone(),
            user_agent: request.user_agent.clone(),
            referrer: request.referrer.clone(),
            permalink: request.permalink.clone(),
            is_test: !self.ctx.config.environment.is_production(),
        })
    }
}
