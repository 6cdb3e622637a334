//! Who may see and do what with a comment.
//!
//! Every authorization decision in the crate goes through this module. The
//! rules are evaluated in a fixed order and the first one that applies
//! decides:
//!
//! 1. moderator-tier actors see everything,
//! 2. a subject with comments disabled is visible only to its owners,
//! 3. authors always see their own comments,
//! 4. deleted text is replaced by a placeholder for everybody else,
//! 5. everybody else only sees clean comments.

use chrono::{DateTime, Utc};

use crate::{
    actor::{Actor, Role},
    entity::prelude::{CommentModel, SpamStatus},
    subject::SubjectInfo,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Edit,
    SoftDelete,
    Restore,
    HardDeleteThread,
    MarkSpam,
    MarkClean,
    Recheck,
    Pin,
    React,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// The comment does not exist as far as this actor is concerned.
    Hidden,
    /// The node is shown to keep the thread intact, its text is not.
    Placeholder { deleted_at: DateTime<Utc> },
    Full,
}

/// Facts about a comment the policy needs beyond the row itself.
#[derive(Debug, Clone, Copy)]
pub struct CommentContext<'a> {
    pub comment: &'a CommentModel,
    pub subject: &'a SubjectInfo,
    pub author_role: Role,
    /// Role of whoever soft-deleted the comment, if it is deleted.
    pub deleter_role: Option<Role>,
}

impl CommentContext<'_> {
    fn is_author(&self, actor: &Actor) -> bool {
        self.comment.user_id == actor.id
    }

    fn is_subject_owner(&self, actor: &Actor) -> bool {
        self.subject.is_owned_by(actor.id)
    }
}

pub fn visibility(actor: Option<&Actor>, ctx: &CommentContext<'_>) -> Visibility {
    let comment = ctx.comment;

    if let Some(actor) = actor {
        if actor.role.is_moderator_tier() {
            return Visibility::Full;
        }
    }

    if ctx.subject.comments_disabled && !actor.is_some_and(|actor| ctx.is_subject_owner(actor)) {
        return Visibility::Hidden;
    }

    if actor.is_some_and(|actor| ctx.is_author(actor)) {
        return Visibility::Full;
    }

    if comment.spam_status != SpamStatus::Clean {
        return Visibility::Hidden;
    }

    match comment.deleted_at {
        Some(deleted_at) => Visibility::Placeholder { deleted_at },
        None => Visibility::Full,
    }
}

/// Whether the actor may read the comment's text.
pub fn can_view(actor: Option<&Actor>, ctx: &CommentContext<'_>) -> bool {
    visibility(actor, ctx) == Visibility::Full
}

pub fn can_act(actor: Option<&Actor>, ctx: &CommentContext<'_>, action: Action) -> bool {
    let Some(actor) = actor else {
        return false;
    };
    if actor.role == Role::Banned {
        return false;
    }

    let comment = ctx.comment;
    let is_author = ctx.is_author(actor);
    let moderator = actor.role.is_moderator_tier();
    let deleted = comment.is_deleted();

    // Ownership-based moderation never reaches moderator-tier authors.
    let owner_may_moderate =
        ctx.is_subject_owner(actor) && !ctx.author_role.is_moderator_tier();

    if !moderator && visibility(Some(actor), ctx) == Visibility::Hidden {
        return false;
    }

    match action {
        Action::Edit => is_author && !deleted,
        Action::SoftDelete => !deleted && (moderator || is_author || owner_may_moderate),
        Action::Restore => {
            let deleted_by_moderator = ctx
                .deleter_role
                .is_some_and(|role| role.is_moderator_tier());
            let deleted_by_author = comment.deleted_by == Some(comment.user_id);

            deleted
                && (moderator
                    || (is_author && deleted_by_author)
                    || (owner_may_moderate && !deleted_by_moderator))
        }
        Action::HardDeleteThread => actor.role.is_administrator(),
        Action::MarkSpam | Action::MarkClean | Action::Recheck => moderator,
        Action::Pin => {
            comment.is_root() && !deleted && (moderator || ctx.is_subject_owner(actor))
        }
        Action::React => !is_author && can_view(Some(actor), ctx),
    }
}

/// Whether the actor may start a new comment or reply on the subject.
pub fn can_create(actor: Option<&Actor>, subject: &SubjectInfo) -> bool {
    match actor {
        Some(actor) => {
            actor.role != Role::Banned && actor.email_verified && subject.can_receive_comments()
        }
        None => false,
    }
}

/// Text to show for a comment: the body, the deletion placeholder, or
/// nothing.
pub fn render_body(
    actor: Option<&Actor>,
    ctx: &CommentContext<'_>,
    body: &str,
) -> Option<String> {
    match visibility(actor, ctx) {
        Visibility::Hidden => None,
        Visibility::Placeholder { deleted_at } => Some(deleted_placeholder(deleted_at)),
        Visibility::Full => Some(body.to_string()),
    }
}

pub fn deleted_placeholder(deleted_at: DateTime<Utc>) -> String {
    format!("[deleted at {}]", deleted_at.format("%Y-%m-%d %H:%M:%S UTC"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ids::{CommentId, ModId, UserId},
        subject::Subject,
    };

    struct Fixture {
        author: Actor,
        stranger: Actor,
        moderator: Actor,
        admin: Actor,
        owner: Actor,
        subject: SubjectInfo,
        comment: CommentModel,
    }

    fn fixture() -> Fixture {
        let author = Actor::new(UserId::new(), Role::Member);
        let owner = Actor::new(UserId::new(), Role::Member);
        let mod_id = ModId::new();

        let subject = SubjectInfo {
            subject: Subject::Mod(mod_id),
            owner: owner.id,
            co_authors: vec![],
            published: true,
            comments_disabled: false,
            display_name: "Better Textures".to_string(),
        };

        let comment = CommentModel {
            id: CommentId::new(),
            commentable_type: subject.subject.kind(),
            commentable_id: subject.subject.raw_id(),
            user_id: author.id,
            parent_id: None,
            root_id: None,
            pinned: false,
            created_at: Utc::now(),
            edited_at: None,
            deleted_at: None,
            deleted_by: None,
            spam_status: SpamStatus::Pending,
            spam_checked_at: None,
            spam_recheck_count: 0,
            spam_metadata: None,
        };

        Fixture {
            author,
            stranger: Actor::new(UserId::new(), Role::Supporter),
            moderator: Actor::new(UserId::new(), Role::Moderator),
            admin: Actor::new(UserId::new(), Role::Administrator),
            owner,
            subject,
            comment,
        }
    }

    fn ctx<'a>(comment: &'a CommentModel, subject: &'a SubjectInfo) -> CommentContext<'a> {
        CommentContext {
            comment,
            subject,
            author_role: Role::Member,
            deleter_role: None,
        }
    }

    #[test]
    fn test_visibility_follows_spam_status() {
        let mut f = fixture();

        for status in [SpamStatus::Pending, SpamStatus::Spam] {
            f.comment.spam_status = status;
            let c = ctx(&f.comment, &f.subject);
            assert!(can_view(Some(&f.author), &c), "{status:?}");
            assert!(!can_view(Some(&f.stranger), &c), "{status:?}");
            assert!(!can_view(None, &c), "{status:?}");
            assert!(can_view(Some(&f.moderator), &c), "{status:?}");
        }

        f.comment.spam_status = SpamStatus::Clean;
        let c = ctx(&f.comment, &f.subject);
        assert!(can_view(Some(&f.author), &c));
        assert!(can_view(Some(&f.stranger), &c));
        assert!(can_view(None, &c));
        assert!(can_view(Some(&f.moderator), &c));
    }

    #[test]
    fn test_deleted_text_only_for_author_and_moderators() {
        let mut f = fixture();
        let deleted_at = Utc::now();
        f.comment.spam_status = SpamStatus::Clean;
        f.comment.deleted_at = Some(deleted_at);
        f.comment.deleted_by = Some(f.author.id);
        let c = ctx(&f.comment, &f.subject);

        assert_eq!(render_body(Some(&f.author), &c, "secret").as_deref(), Some("secret"));
        assert_eq!(render_body(Some(&f.moderator), &c, "secret").as_deref(), Some("secret"));
        assert_eq!(
            visibility(Some(&f.stranger), &c),
            Visibility::Placeholder { deleted_at }
        );

        let placeholder = render_body(None, &c, "secret").unwrap();
        assert!(placeholder.starts_with("[deleted at "));
        assert!(!placeholder.contains("secret"));
    }

    #[test]
    fn test_comments_disabled_hides_everything_from_non_owners() {
        let mut f = fixture();
        f.comment.spam_status = SpamStatus::Clean;
        f.subject.comments_disabled = true;
        let c = ctx(&f.comment, &f.subject);

        assert!(!can_view(Some(&f.author), &c));
        assert!(!can_view(Some(&f.stranger), &c));
        assert!(!can_view(None, &c));
        assert!(can_view(Some(&f.owner), &c));
        assert!(can_view(Some(&f.moderator), &c));

        // the author loses edit rights along with visibility
        assert!(!can_act(Some(&f.author), &c, Action::Edit));
    }

    #[test]
    fn test_edit_is_author_only() {
        let mut f = fixture();
        f.comment.spam_status = SpamStatus::Clean;
        let c = ctx(&f.comment, &f.subject);

        assert!(can_act(Some(&f.author), &c, Action::Edit));
        assert!(!can_act(Some(&f.owner), &c, Action::Edit));
        assert!(!can_act(Some(&f.moderator), &c, Action::Edit));
        assert!(!can_act(Some(&f.admin), &c, Action::Edit));

        f.comment.deleted_at = Some(Utc::now());
        let c = ctx(&f.comment, &f.subject);
        assert!(!can_act(Some(&f.author), &c, Action::Edit));
    }

    #[test]
    fn test_owner_cannot_moderate_moderator_comments() {
        let mut f = fixture();
        f.comment.spam_status = SpamStatus::Clean;

        let c = ctx(&f.comment, &f.subject);
        assert!(can_act(Some(&f.owner), &c, Action::SoftDelete));
        assert!(!can_act(Some(&f.stranger), &c, Action::SoftDelete));

        let mut c = ctx(&f.comment, &f.subject);
        c.author_role = Role::SuperModerator;
        assert!(!can_act(Some(&f.owner), &c, Action::SoftDelete));
        assert!(can_act(Some(&f.moderator), &c, Action::SoftDelete));
    }

    #[test]
    fn test_restore_rules() {
        let mut f = fixture();
        f.comment.spam_status = SpamStatus::Clean;
        f.comment.deleted_at = Some(Utc::now());

        // deleted by the author
        f.comment.deleted_by = Some(f.author.id);
        let mut c = ctx(&f.comment, &f.subject);
        c.deleter_role = Some(Role::Member);
        assert!(can_act(Some(&f.author), &c, Action::Restore));
        assert!(can_act(Some(&f.owner), &c, Action::Restore));
        assert!(can_act(Some(&f.moderator), &c, Action::Restore));
        assert!(!can_act(Some(&f.stranger), &c, Action::Restore));

        // deleted by a moderator
        f.comment.deleted_by = Some(f.moderator.id);
        let mut c = ctx(&f.comment, &f.subject);
        c.deleter_role = Some(Role::Moderator);
        assert!(!can_act(Some(&f.author), &c, Action::Restore));
        assert!(!can_act(Some(&f.owner), &c, Action::Restore));
        assert!(can_act(Some(&f.admin), &c, Action::Restore));

        // not deleted at all
        f.comment.deleted_at = None;
        let c = ctx(&f.comment, &f.subject);
        assert!(!can_act(Some(&f.moderator), &c, Action::Restore));
    }

    #[test]
    fn test_hard_delete_thread_is_admin_only() {
        let f = fixture();
        let c = ctx(&f.comment, &f.subject);

        assert!(can_act(Some(&f.admin), &c, Action::HardDeleteThread));
        assert!(!can_act(Some(&f.moderator), &c, Action::HardDeleteThread));
        assert!(!can_act(Some(&f.author), &c, Action::HardDeleteThread));
        assert!(!can_act(Some(&f.owner), &c, Action::HardDeleteThread));
    }

    #[test]
    fn test_spam_actions_are_moderator_tier() {
        let f = fixture();
        let c = ctx(&f.comment, &f.subject);

        for action in [Action::MarkSpam, Action::MarkClean, Action::Recheck] {
            assert!(can_act(Some(&f.moderator), &c, action));
            assert!(can_act(Some(&f.admin), &c, action));
            assert!(!can_act(Some(&f.author), &c, action));
            assert!(!can_act(Some(&f.owner), &c, action));
        }
    }

    #[test]
    fn test_react_rules() {
        let mut f = fixture();
        f.comment.spam_status = SpamStatus::Clean;
        let c = ctx(&f.comment, &f.subject);

        assert!(!can_act(Some(&f.author), &c, Action::React));
        assert!(can_act(Some(&f.stranger), &c, Action::React));
        assert!(!can_act(None, &c, Action::React));

        let banned = Actor::new(UserId::new(), Role::Banned);
        assert!(!can_act(Some(&banned), &c, Action::React));
    }

    #[test]
    fn test_pin_only_roots() {
        let mut f = fixture();
        f.comment.spam_status = SpamStatus::Clean;
        let c = ctx(&f.comment, &f.subject);
        assert!(can_act(Some(&f.owner), &c, Action::Pin));
        assert!(can_act(Some(&f.moderator), &c, Action::Pin));
        assert!(!can_act(Some(&f.stranger), &c, Action::Pin));

        f.comment.parent_id = Some(CommentId::new());
        f.comment.root_id = f.comment.parent_id;
        let c = ctx(&f.comment, &f.subject);
        assert!(!can_act(Some(&f.moderator), &c, Action::Pin));
    }

    #[test]
    fn test_can_create() {
        let f = fixture();
        assert!(can_create(Some(&f.stranger), &f.subject));
        assert!(!can_create(None, &f.subject));
        assert!(!can_create(Some(&f.stranger.unverified()), &f.subject));

        let banned = Actor::new(UserId::new(), Role::Banned);
        assert!(!can_create(Some(&banned), &f.subject));

        let mut unpublished = f.subject.clone();
        unpublished.published = false;
        assert!(!can_create(Some(&f.moderator), &unpublished));

        let mut disabled = f.subject.clone();
        disabled.comments_disabled = true;
        assert!(!can_create(Some(&f.owner), &disabled));
    }
}
