//! Fan-out of "someone commented" notifications.
//!
//! Dispatch runs from a delayed task and may run more than once for the
//! same comment. Each (recipient, comment, class) is claimed in the
//! notification log before it is handed to the sink, so a repeat run sends
//! nothing twice.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    entity::prelude::*,
    error::CommentError,
    ids::{CommentId, UserId},
    models::{comments as store, notification_log, subscriptions},
    policy,
    service::{LoadedComment, ServiceContext},
    subject::Subject,
};

const EXCERPT_CHARS: usize = 140;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Database,
    Mail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingNotification {
    pub recipient_id: UserId,
    pub recipient_email: Option<String>,
    pub class: NotificationClass,
    pub channels: Vec<Channel>,
    pub comment_id: CommentId,
    pub subject: Subject,
    pub subject_name: String,
    pub commenter_id: UserId,
    pub commenter_name: String,
    pub excerpt: String,
}

impl OutgoingNotification {
    pub fn has_channel(&self, channel: Channel) -> bool {
        self.channels.contains(&channel)
    }

    fn scope(&self) -> DeliveryScope {
        if self.has_channel(Channel::Mail) {
            DeliveryScope::All
        } else {
            DeliveryScope::Database
        }
    }
}

#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Where notifications go: the in-app inbox, a mailer, or both.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &OutgoingNotification) -> Result<(), DeliveryError>;
}

/// Sink that only logs. Useful until a real transport is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn deliver(&self, notification: &OutgoingNotification) -> Result<(), DeliveryError> {
        info!(
            recipient_id = %notification.recipient_id,
            comment_id = %notification.comment_id,
            class = ?notification.class,
            channels = ?notification.channels,
            "notification delivered"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Comment removed, deleted or spam. Nothing will ever be sent.
    Aborted,
    /// Still waiting on the spam check. Try again later.
    Deferred,
    Dispatched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub outcome: DispatchOutcome,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl DispatchReport {
    fn new(outcome: DispatchOutcome) -> Self {
        Self {
            outcome,
            sent: 0,
            skipped: 0,
            failed: 0,
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    ctx: ServiceContext,
    sink: Arc<dyn NotificationSink>,
}

impl Notifier {
    pub fn new(ctx: ServiceContext, sink: Arc<dyn NotificationSink>) -> Self {
        Self { ctx, sink }
    }

    pub async fn dispatch(&self, comment_id: CommentId) -> Result<DispatchReport, CommentError> {
        let Some(comment) = store::find(&self.ctx.db, comment_id).await? else {
            debug!(%comment_id, "comment gone, nothing to notify");
            return Ok(DispatchReport::new(DispatchOutcome::Aborted));
        };
        if comment.is_deleted() {
            debug!(%comment_id, "comment deleted, nothing to notify");
            return Ok(DispatchReport::new(DispatchOutcome::Aborted));
        }
        match comment.spam_status {
            SpamStatus::Spam => {
                debug!(%comment_id, "comment is spam, nothing to notify");
                return Ok(DispatchReport::new(DispatchOutcome::Aborted));
            }
            SpamStatus::Pending => {
                debug!(%comment_id, "spam check pending, deferring notifications");
                return Ok(DispatchReport::new(DispatchOutcome::Deferred));
            }
            SpamStatus::Clean => {}
        }

        let loaded = match self.ctx.load_context(comment).await {
            Ok(loaded) => loaded,
            Err(CommentError::NotFound(_)) => {
                return Ok(DispatchReport::new(DispatchOutcome::Aborted));
            }
            Err(error) => return Err(error),
        };

        let recipients = self.recipients(&loaded).await?;
        let mut report = DispatchReport::new(DispatchOutcome::Dispatched);
        if recipients.is_empty() {
            return Ok(report);
        }

        let comment = &loaded.comment;
        let body = store::current_body(&self.ctx.db, comment.id)
            .await?
            .unwrap_or_default();
        let commenter_name = self
            .ctx
            .directory
            .user(comment.user_id)
            .await
            .map(|user| user.display_name)
            .unwrap_or_default();

        for (recipient_id, class) in recipients {
            let Some(recipient) = self.ctx.directory.user(recipient_id).await else {
                report.skipped += 1;
                continue;
            };
            if !policy::can_view(Some(&recipient.as_actor()), &loaded.policy_context()) {
                debug!(%comment_id, %recipient_id, "recipient cannot see comment, skipping");
                report.skipped += 1;
                continue;
            }

            let wants_mail = match class {
                NotificationClass::CommentReply => recipient.email_preferences.replies,
                NotificationClass::NewComment => recipient.email_preferences.subscriptions,
            };
            let mut channels = vec![Channel::Database];
            if wants_mail && recipient.email.is_some() {
                channels.push(Channel::Mail);
            }

            let notification = OutgoingNotification {
                recipient_id,
                recipient_email: recipient.email.clone(),
                class,
                channels,
                comment_id,
                subject: loaded.subject.subject,
                subject_name: loaded.subject.display_name.clone(),
                commenter_id: comment.user_id,
                commenter_name: commenter_name.clone(),
                excerpt: excerpt(&body),
            };

            let now = self.ctx.clock.now();
            let Some(claim) = notification_log::claim(
                &self.ctx.db,
                recipient_id,
                comment_id,
                class,
                notification.scope(),
                now,
            )
            .await?
            else {
                debug!(%comment_id, %recipient_id, ?class, "already notified");
                report.skipped += 1;
                continue;
            };

            match self.sink.deliver(&notification).await {
                Ok(()) => report.sent += 1,
                Err(error) => {
                    warn!(%comment_id, %recipient_id, %error, "notification delivery failed");
                    notification_log::release(&self.ctx.db, claim).await?;
                    report.failed += 1;
                }
            }
        }

        info!(
            %comment_id,
            sent = report.sent,
            skipped = report.skipped,
            failed = report.failed,
            "notifications dispatched"
        );
        Ok(report)
    }

    /// Parent author first, then subscribers. Nobody hears about their own
    /// comment and nobody is notified twice.
    async fn recipients(
        &self,
        loaded: &LoadedComment,
    ) -> Result<Vec<(UserId, NotificationClass)>, CommentError> {
        let comment = &loaded.comment;
        let mut recipients = Vec::new();

        if let Some(parent_id) = comment.parent_id {
            if let Some(parent) = store::find(&self.ctx.db, parent_id).await? {
                if parent.user_id != comment.user_id {
                    recipients.push((parent.user_id, NotificationClass::CommentReply));
                }
            }
        }

        for subscriber in subscriptions::subscribers(&self.ctx.db, comment.subject()).await? {
            if subscriber == comment.user_id
                || recipients.iter().any(|(user_id, _)| *user_id == subscriber)
            {
                continue;
            }
            recipients.push((subscriber, NotificationClass::NewComment));
        }

        Ok(recipients)
    }
}

fn excerpt(body: &str) -> String {
    if body.chars().count() <= EXCERPT_CHARS {
        return body.to_string();
    }
    let mut excerpt: String = body.chars().take(EXCERPT_CHARS).collect();
    excerpt.push('…');
    excerpt
}
