use std::{collections::HashMap, fmt, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use sea_orm::Condition;
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    actor::{Actor, RequestContext, Role},
    entity::prelude::*,
    error::CommentError,
    events::CommentEvent,
    ids::{CommentId, UserId},
    locks::KeyedLocks,
    models::{
        comments::{self as store, NewComment},
        reactions, subscriptions,
    },
    policy::{self, Action, CommentContext, Visibility},
    queue,
    rate_limit::RateLimiter,
    service::ServiceContext,
    subject::{Subject, SubjectInfo},
    validation::validate_body,
};

/// What the writer gets back after a create or an edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HydratedComment {
    pub comment: CommentModel,
    pub body: String,
    pub version_number: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CommentBody {
    Text(String),
    Deleted { deleted_at: DateTime<Utc> },
}

impl fmt::Display for CommentBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommentBody::Text(text) => f.write_str(text),
            CommentBody::Deleted { deleted_at } => {
                f.write_str(&policy::deleted_placeholder(*deleted_at))
            }
        }
    }
}

/// A comment as one particular viewer is allowed to see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentView {
    pub id: CommentId,
    pub subject: Subject,
    pub user_id: UserId,
    pub parent_id: Option<CommentId>,
    pub root_id: Option<CommentId>,
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Only for the author and moderators.
    pub spam_status: Option<SpamStatus>,
    pub body: CommentBody,
    pub reaction_count: u64,
    pub liked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
}

#[derive(Clone)]
pub struct CommentsService {
    ctx: ServiceContext,
    limiter: Arc<RateLimiter>,
    edit_locks: Arc<KeyedLocks<CommentId>>,
    reaction_locks: Arc<KeyedLocks<(CommentId, UserId)>>,
}

impl CommentsService {
    pub fn new(ctx: ServiceContext) -> Self {
        let limiter = Arc::new(RateLimiter::new(ctx.config.rate_limit.window_secs));
        Self {
            ctx,
            limiter,
            edit_locks: Arc::new(KeyedLocks::new()),
            reaction_locks: Arc::new(KeyedLocks::new()),
        }
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Posts a new comment, or a reply when `parent_id` is given.
    pub async fn create(
        &self,
        actor: Option<&Actor>,
        subject: Subject,
        raw_body: &str,
        parent_id: Option<CommentId>,
        request: &RequestContext,
    ) -> Result<HydratedComment, CommentError> {
        let subject_info = self
            .ctx
            .directory
            .subject(subject)
            .await
            .ok_or(CommentError::NotFound("subject"))?;

        let actor = match actor {
            Some(actor) if policy::can_create(Some(actor), &subject_info) => actor,
            _ => return Err(CommentError::Forbidden),
        };

        let body = validate_body(raw_body, &self.ctx.config.limits)?;

        let parent = match parent_id {
            Some(parent_id) => {
                let parent = store::find_in_subject(&self.ctx.db, subject, parent_id)
                    .await?
                    .ok_or(CommentError::NotFound("parent comment"))?;
                let loaded = self.ctx.load_context(parent).await?;
                if loaded.comment.is_deleted()
                    || !policy::can_view(Some(actor), &loaded.policy_context())
                {
                    return Err(CommentError::Forbidden);
                }
                Some(loaded.comment)
            }
            None => None,
        };

        let now = self.ctx.clock.now();
        let permit = self.limiter.check(actor, subject, now)?;

        let result = self
            .persist_new(subject, actor.id, parent.as_ref(), body, request, now)
            .await;
        let (comment, version) = match result {
            Ok(created) => created,
            Err(error) => {
                if let Some(permit) = permit {
                    self.limiter.release(permit);
                }
                return Err(error);
            }
        };

        info!(
            comment_id = %comment.id,
            %subject,
            author_id = %actor.id,
            reply = comment.parent_id.is_some(),
            "comment created"
        );
        self.ctx.events.publish(CommentEvent::Created {
            comment_id: comment.id,
            subject,
            parent_id: comment.parent_id,
        });

        Ok(HydratedComment {
            comment,
            body: version.body,
            version_number: version.version_number,
        })
    }

    async fn persist_new(
        &self,
        subject: Subject,
        author: UserId,
        parent: Option<&CommentModel>,
        body: String,
        request: &RequestContext,
        now: DateTime<Utc>,
    ) -> Result<(CommentModel, CommentVersionModel), CommentError> {
        let config = &self.ctx.config;
        let notify_at = now + Duration::seconds(config.notifications.delay_secs as i64);

        let txn = self.ctx.db.begin().await?;
        let (comment, version) = store::insert_comment(
            &txn,
            NewComment {
                subject,
                author,
                parent,
                body,
                now,
            },
        )
        .await?;

        queue::enqueue(
            &txn,
            TaskKind::SpamCheck,
            comment.id,
            Some(request),
            now,
            config.worker.max_attempts,
            now,
        )
        .await?;
        queue::enqueue::<_, RequestContext>(
            &txn,
            TaskKind::Notify,
            comment.id,
            None,
            notify_at,
            config.worker.max_attempts,
            now,
        )
        .await?;

        txn.commit().await?;
        Ok((comment, version))
    }

    /// Replaces the text of a comment with a new version. Author only.
    pub async fn update(
        &self,
        actor: &Actor,
        comment_id: CommentId,
        raw_body: &str,
    ) -> Result<HydratedComment, CommentError> {
        let loaded = self.ctx.load_comment(comment_id).await?;
        if !policy::can_act(Some(actor), &loaded.policy_context(), Action::Edit) {
            return Err(CommentError::Forbidden);
        }

        let body = validate_body(raw_body, &self.ctx.config.limits)?;

        let version = {
            let _guard = self.edit_locks.lock(comment_id).await;
            store::append_version(&self.ctx.db, comment_id, body, self.ctx.clock.now()).await?
        };

        debug!(%comment_id, version = version.version_number, "comment edited");
        self.ctx.events.publish(CommentEvent::Updated {
            comment_id,
            subject: loaded.comment.subject(),
            version_number: version.version_number,
        });

        let comment = store::find(&self.ctx.db, comment_id)
            .await?
            .ok_or(CommentError::NotFound("comment"))?;
        Ok(HydratedComment {
            comment,
            body: version.body,
            version_number: version.version_number,
        })
    }

    /// A single comment. Comments the viewer may not see are reported as
    /// missing.
    pub async fn get(
        &self,
        actor: Option<&Actor>,
        comment_id: CommentId,
    ) -> Result<CommentView, CommentError> {
        let loaded = self.ctx.load_comment(comment_id).await?;
        let subject = loaded.subject.clone();

        self.hydrate(actor, &subject, vec![loaded.comment])
            .await?
            .pop()
            .ok_or(CommentError::NotFound("comment"))
    }

    /// Top-level comments of a subject, pinned first and then newest first.
    /// `page` starts at 1.
    pub async fn list_root_comments(
        &self,
        actor: Option<&Actor>,
        subject: Subject,
        page: u64,
        per_page: u64,
    ) -> Result<Page<CommentView>, CommentError> {
        let subject_info = self
            .ctx
            .directory
            .subject(subject)
            .await
            .ok_or(CommentError::NotFound("subject"))?;

        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);

        let mut query = Comment::find()
            .filter(CommentColumn::CommentableType.eq(subject.kind()))
            .filter(CommentColumn::CommentableId.eq(subject.raw_id()))
            .filter(CommentColumn::ParentId.is_null());

        // push the common visibility cut into SQL so pages stay full
        let moderator = actor.is_some_and(|actor| actor.role.is_moderator_tier());
        if !moderator {
            let mut visible = Condition::any().add(CommentColumn::SpamStatus.eq(SpamStatus::Clean));
            if let Some(actor) = actor {
                visible = visible.add(CommentColumn::UserId.eq(actor.id));
            }
            query = query.filter(visible);

            let owner = actor.is_some_and(|actor| subject_info.is_owned_by(actor.id));
            if subject_info.comments_disabled && !owner {
                return Ok(Page {
                    items: vec![],
                    page,
                    per_page,
                    total: 0,
                });
            }
        }

        let total = query.clone().count(&self.ctx.db).await?;
        let roots = query
            .order_by_desc(CommentColumn::Pinned)
            .order_by_desc(CommentColumn::CreatedAt)
            .order_by_desc(CommentColumn::Id)
            .limit(per_page)
            .offset((page - 1) * per_page)
            .all(&self.ctx.db)
            .await?;

        let items = self.hydrate(actor, &subject_info, roots).await?;
        Ok(Page {
            items,
            page,
            per_page,
            total,
        })
    }

    /// Every reply under a root comment, oldest first.
    pub async fn list_thread(
        &self,
        actor: Option<&Actor>,
        root_id: CommentId,
    ) -> Result<Vec<CommentView>, CommentError> {
        let root = self.ctx.load_comment(root_id).await?;
        if !root.comment.is_root()
            || policy::visibility(actor, &root.policy_context()) == Visibility::Hidden
        {
            return Err(CommentError::NotFound("comment"));
        }

        let replies = Comment::find()
            .filter(CommentColumn::RootId.eq(root_id))
            .order_by_asc(CommentColumn::CreatedAt)
            .order_by_asc(CommentColumn::Id)
            .all(&self.ctx.db)
            .await?;

        self.hydrate(actor, &root.subject, replies).await
    }

    /// Edit history, oldest first. Only for viewers who can read the text.
    pub async fn versions(
        &self,
        actor: Option<&Actor>,
        comment_id: CommentId,
    ) -> Result<Vec<CommentVersionModel>, CommentError> {
        let loaded = self.ctx.load_comment(comment_id).await?;
        match policy::visibility(actor, &loaded.policy_context()) {
            Visibility::Hidden => Err(CommentError::NotFound("comment")),
            Visibility::Placeholder { .. } => Err(CommentError::Forbidden),
            Visibility::Full => Ok(store::versions(&self.ctx.db, comment_id).await?),
        }
    }

    /// Likes or unlikes. Returns whether the actor likes it afterwards.
    pub async fn toggle_reaction(
        &self,
        actor: &Actor,
        comment_id: CommentId,
    ) -> Result<bool, CommentError> {
        let loaded = self.ctx.load_comment(comment_id).await?;
        if !policy::can_act(Some(actor), &loaded.policy_context(), Action::React) {
            return Err(CommentError::Forbidden);
        }

        let liked = {
            let _guard = self.reaction_locks.lock((comment_id, actor.id)).await;
            reactions::toggle(&self.ctx.db, comment_id, actor.id, self.ctx.clock.now()).await?
        };

        self.ctx.events.publish(CommentEvent::ReactionToggled {
            comment_id,
            user_id: actor.id,
            liked,
        });
        Ok(liked)
    }

    pub async fn reaction_count(
        &self,
        actor: Option<&Actor>,
        comment_id: CommentId,
    ) -> Result<u64, CommentError> {
        let loaded = self.ctx.load_comment(comment_id).await?;
        if policy::visibility(actor, &loaded.policy_context()) == Visibility::Hidden {
            return Err(CommentError::NotFound("comment"));
        }
        Ok(reactions::count(&self.ctx.db, comment_id).await?)
    }

    pub async fn subscribe(&self, actor: &Actor, subject: Subject) -> Result<(), CommentError> {
        self.subscribable(actor, subject).await?;
        subscriptions::subscribe(&self.ctx.db, actor.id, subject, self.ctx.clock.now()).await?;
        debug!(user_id = %actor.id, %subject, "subscribed");
        Ok(())
    }

    pub async fn unsubscribe(&self, actor: &Actor, subject: Subject) -> Result<(), CommentError> {
        subscriptions::unsubscribe(&self.ctx.db, actor.id, subject).await?;
        debug!(user_id = %actor.id, %subject, "unsubscribed");
        Ok(())
    }

    pub async fn is_subscribed(&self, actor: &Actor, subject: Subject) -> Result<bool, CommentError> {
        Ok(subscriptions::is_subscribed(&self.ctx.db, actor.id, subject).await?)
    }

    async fn subscribable(&self, actor: &Actor, subject: Subject) -> Result<(), CommentError> {
        if self.ctx.directory.subject(subject).await.is_none() {
            return Err(CommentError::NotFound("subject"));
        }
        if actor.role == Role::Banned {
            return Err(CommentError::Forbidden);
        }
        Ok(())
    }

    /// Applies the policy to each row and attaches bodies and reactions.
    /// Rows the viewer may not see are dropped.
    async fn hydrate(
        &self,
        actor: Option<&Actor>,
        subject: &SubjectInfo,
        comments: Vec<CommentModel>,
    ) -> Result<Vec<CommentView>, CommentError> {
        let mut roles: HashMap<UserId, Role> = HashMap::new();
        let mut visible = Vec::with_capacity(comments.len());

        for comment in comments {
            let author_role = self.cached_role(&mut roles, comment.user_id).await;
            let deleter_role = match comment.deleted_by {
                Some(deleted_by) => Some(self.cached_role(&mut roles, deleted_by).await),
                None => None,
            };
            let ctx = CommentContext {
                comment: &comment,
                subject,
                author_role,
                deleter_role,
            };

            let visibility = policy::visibility(actor, &ctx);
            if visibility == Visibility::Hidden {
                continue;
            }
            let sees_status = actor.is_some_and(|actor| {
                actor.role.is_moderator_tier() || actor.id == comment.user_id
            });
            visible.push((comment, visibility, sees_status));
        }

        let ids: Vec<CommentId> = visible.iter().map(|(comment, _, _)| comment.id).collect();
        let mut bodies = store::current_bodies(&self.ctx.db, &ids).await?;
        let likes = reactions::summaries(&self.ctx.db, &ids, actor.map(|actor| actor.id)).await?;

        let mut views = Vec::with_capacity(visible.len());
        for (comment, visibility, sees_status) in visible {
            let body = match visibility {
                Visibility::Placeholder { deleted_at } => CommentBody::Deleted { deleted_at },
                _ => CommentBody::Text(bodies.remove(&comment.id).unwrap_or_default()),
            };
            let summary = likes.get(&comment.id).copied().unwrap_or_default();

            views.push(CommentView {
                id: comment.id,
                subject: comment.subject(),
                user_id: comment.user_id,
                parent_id: comment.parent_id,
                root_id: comment.root_id,
                pinned: comment.pinned,
                created_at: comment.created_at,
                edited_at: comment.edited_at,
                deleted_at: comment.deleted_at,
                spam_status: sees_status.then_some(comment.spam_status),
                body,
                reaction_count: summary.count,
                liked: summary.liked,
            });
        }

        Ok(views)
    }

    async fn cached_role(&self, roles: &mut HashMap<UserId, Role>, user_id: UserId) -> Role {
        if let Some(role) = roles.get(&user_id) {
            return *role;
        }
        let role = self.ctx.directory.role_of(user_id).await;
        roles.insert(user_id, role);
        role
    }
}
