//! Comment store operations. Everything here is generic over the
//! connection so callers can compose several steps in one transaction;
//! authorization lives in the service layer.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;

use crate::{
    entity::prelude::*,
    ids::{CommentId, UserId, VersionId},
    subject::Subject,
};

/// Everything needed to insert a comment together with its first version.
pub struct NewComment<'a> {
    pub subject: Subject,
    pub author: UserId,
    pub parent: Option<&'a CommentModel>,
    pub body: String,
    pub now: DateTime<Utc>,
}

/// Inserts the comment row and version #1. Run inside a transaction so the
/// two land together.
pub async fn insert_comment<C>(
    db: &C,
    new: NewComment<'_>,
) -> Result<(CommentModel, CommentVersionModel), DbErr>
where
    C: ConnectionTrait,
{
    let (parent_id, root_id) = match new.parent {
        // a reply to a reply still points at the top of the thread
        Some(parent) => (Some(parent.id), Some(parent.root_id.unwrap_or(parent.id))),
        None => (None, None),
    };

    let comment = CommentActiveModel {
        id: Set(CommentId::new()),
        commentable_type: Set(new.subject.kind()),
        commentable_id: Set(new.subject.raw_id()),
        user_id: Set(new.author),
        parent_id: Set(parent_id),
        root_id: Set(root_id),
        pinned: Set(false),
        created_at: Set(new.now),
        edited_at: Set(None),
        deleted_at: Set(None),
        deleted_by: Set(None),
        spam_status: Set(SpamStatus::Pending),
        spam_checked_at: Set(None),
        spam_recheck_count: Set(0),
        spam_metadata: Set(None),
    };
    let comment = Comment::insert(comment).exec_with_returning(db).await?;

    let version = CommentVersionActiveModel {
        id: Set(VersionId::new()),
        comment_id: Set(comment.id),
        version_number: Set(1),
        body: Set(new.body),
        created_at: Set(new.now),
    };
    let version = CommentVersion::insert(version)
        .exec_with_returning(db)
        .await?;

    Ok((comment, version))
}

pub async fn find<C>(db: &C, id: CommentId) -> Result<Option<CommentModel>, DbErr>
where
    C: ConnectionTrait,
{
    Comment::find_by_id(id).one(db).await
}

/// Looks a comment up only within `subject`. A comment that exists on
/// another subject is reported as absent.
pub async fn find_in_subject<C>(
    db: &C,
    subject: Subject,
    id: CommentId,
) -> Result<Option<CommentModel>, DbErr>
where
    C: ConnectionTrait,
{
    Comment::find_by_id(id)
        .filter(CommentColumn::CommentableType.eq(subject.kind()))
        .filter(CommentColumn::CommentableId.eq(subject.raw_id()))
        .one(db)
        .await
}

/// The version with the highest number, i.e. what the comment says now.
pub async fn current_version<C>(
    db: &C,
    comment_id: CommentId,
) -> Result<Option<CommentVersionModel>, DbErr>
where
    C: ConnectionTrait,
{
    CommentVersion::find()
        .filter(CommentVersionColumn::CommentId.eq(comment_id))
        .order_by_desc(CommentVersionColumn::VersionNumber)
        .one(db)
        .await
}

pub async fn current_body<C>(db: &C, comment_id: CommentId) -> Result<Option<String>, DbErr>
where
    C: ConnectionTrait,
{
    Ok(current_version(db, comment_id)
        .await?
        .map(|version| version.body))
}

/// Current bodies for a batch of comments, for hydrating list views.
pub async fn current_bodies<C>(
    db: &C,
    comment_ids: &[CommentId],
) -> Result<HashMap<CommentId, String>, DbErr>
where
    C: ConnectionTrait,
{
    if comment_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let versions = CommentVersion::find()
        .filter(CommentVersionColumn::CommentId.is_in(comment_ids.iter().copied()))
        .order_by_asc(CommentVersionColumn::VersionNumber)
        .all(db)
        .await?;

    // ascending order, so the last write per comment wins
    let mut bodies = HashMap::with_capacity(comment_ids.len());
    for version in versions {
        bodies.insert(version.comment_id, version.body);
    }
    Ok(bodies)
}

/// All versions of a comment, oldest first.
pub async fn versions<C>(db: &C, comment_id: CommentId) -> Result<Vec<CommentVersionModel>, DbErr>
where
    C: ConnectionTrait,
{
    CommentVersion::find()
        .filter(CommentVersionColumn::CommentId.eq(comment_id))
        .order_by_asc(CommentVersionColumn::VersionNumber)
        .all(db)
        .await
}

/// Appends version `max + 1` and stamps `edited_at`. Callers serialize
/// per comment; the unique (comment_id, version_number) index backs that up.
pub async fn append_version<C>(
    db: &C,
    comment_id: CommentId,
    body: String,
    now: DateTime<Utc>,
) -> Result<CommentVersionModel, DbErr>
where
    C: ConnectionTrait,
{
    let next = current_version(db, comment_id)
        .await?
        .map(|version| version.version_number + 1)
        .unwrap_or(1);

    let version = CommentVersionActiveModel {
        id: Set(VersionId::new()),
        comment_id: Set(comment_id),
        version_number: Set(next),
        body: Set(body),
        created_at: Set(now),
    };
    let version = CommentVersion::insert(version)
        .exec_with_returning(db)
        .await?;

    Comment::update_many()
        .col_expr(CommentColumn::EditedAt, Expr::value(now))
        .filter(CommentColumn::Id.eq(comment_id))
        .exec(db)
        .await?;

    Ok(version)
}

/// Marks a comment deleted. Descendants are left alone. Returns false when
/// it was already deleted.
pub async fn soft_delete<C>(
    db: &C,
    comment_id: CommentId,
    deleted_by: UserId,
    now: DateTime<Utc>,
) -> Result<bool, DbErr>
where
    C: ConnectionTrait,
{
    let result = Comment::update_many()
        .col_expr(CommentColumn::DeletedAt, Expr::value(now))
        .col_expr(CommentColumn::DeletedBy, Expr::value(deleted_by))
        .filter(CommentColumn::Id.eq(comment_id))
        .filter(CommentColumn::DeletedAt.is_null())
        .exec(db)
        .await?;

    Ok(result.rows_affected > 0)
}

/// Clears the deletion marker. Returns false when it was not deleted.
pub async fn restore<C>(db: &C, comment_id: CommentId) -> Result<bool, DbErr>
where
    C: ConnectionTrait,
{
    let result = Comment::update_many()
        .col_expr(CommentColumn::DeletedAt, Expr::value(Option::<DateTime<Utc>>::None))
        .col_expr(CommentColumn::DeletedBy, Expr::value(Option::<UserId>::None))
        .filter(CommentColumn::Id.eq(comment_id))
        .filter(CommentColumn::DeletedAt.is_not_null())
        .exec(db)
        .await?;

    Ok(result.rows_affected > 0)
}

/// The comment and every descendant, each parent listed before its
/// children. Walks an explicit worklist rather than recursing.
pub async fn subtree<C>(db: &C, comment: CommentModel) -> Result<Vec<CommentModel>, DbErr>
where
    C: ConnectionTrait,
{
    let mut stack = vec![comment.id];
    let mut nodes = vec![comment];

    while let Some(id) = stack.pop() {
        let children = Comment::find()
            .filter(CommentColumn::ParentId.eq(id))
            .order_by_asc(CommentColumn::Id)
            .all(db)
            .await?;

        for child in children {
            stack.push(child.id);
            nodes.push(child);
        }
    }

    Ok(nodes)
}

/// Number of descendants that are not soft-deleted.
pub async fn surviving_descendants<C>(db: &C, comment: &CommentModel) -> Result<usize, DbErr>
where
    C: ConnectionTrait,
{
    let nodes = subtree(db, comment.clone()).await?;
    Ok(nodes
        .iter()
        .skip(1)
        .filter(|node| node.deleted_at.is_none())
        .count())
}

/// Physically removes the comment's whole subtree with its versions and
/// reactions, leaves first. Returns the removed ids.
pub async fn hard_delete_subtree<C>(db: &C, comment: CommentModel) -> Result<Vec<CommentId>, DbErr>
where
    C: ConnectionTrait,
{
    let nodes = subtree(db, comment).await?;
    let ids: Vec<CommentId> = nodes.iter().map(|node| node.id).collect();

    CommentVersion::delete_many()
        .filter(CommentVersionColumn::CommentId.is_in(ids.iter().copied()))
        .exec(db)
        .await?;

    CommentReaction::delete_many()
        .filter(CommentReactionColumn::CommentId.is_in(ids.iter().copied()))
        .exec(db)
        .await?;

    // children were pushed after their parents
    for id in ids.iter().rev() {
        Comment::delete_by_id(*id).exec(db).await?;
    }

    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ids::ModId, test_utils};
    use chrono::Duration;

    async fn insert(
        db: &DatabaseConnection,
        subject: Subject,
        parent: Option<&CommentModel>,
        body: &str,
    ) -> CommentModel {
        let (comment, _) = insert_comment(
            db,
            NewComment {
                subject,
                author: UserId::new(),
                parent,
                body: body.to_string(),
                now: Utc::now(),
            },
        )
        .await
        .unwrap();
        comment
    }

    #[tokio::test]
    async fn test_root_id_resolution() {
        let db = test_utils::setup_test_db().await;
        let subject = Subject::Mod(ModId::new());

        let root = insert(&db, subject, None, "root comment").await;
        let reply = insert(&db, subject, Some(&root), "first reply").await;
        let nested = insert(&db, subject, Some(&reply), "nested reply").await;

        assert_eq!(root.parent_id, None);
        assert_eq!(root.root_id, None);
        assert_eq!(reply.parent_id, Some(root.id));
        assert_eq!(reply.root_id, Some(root.id));
        assert_eq!(nested.parent_id, Some(reply.id));
        assert_eq!(nested.root_id, Some(root.id));
        assert_eq!(nested.thread_id(), root.id);
    }

    #[tokio::test]
    async fn test_root_comment_reads_back_with_null_ids() {
        let db = test_utils::setup_test_db().await;
        let subject = Subject::Mod(ModId::new());
        let root = insert(&db, subject, None, "root comment").await;

        let found = find(&db, root.id).await.unwrap().unwrap();
        assert_eq!(found.parent_id, None);
        assert_eq!(found.root_id, None);
        assert_eq!(found.deleted_by, None);
        assert_eq!(found, root);

        let all = Comment::find().all(&db).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_cross_subject_lookup_is_absent() {
        let db = test_utils::setup_test_db().await;
        let subject = Subject::Mod(ModId::new());
        let other = Subject::Mod(ModId::new());

        let comment = insert(&db, subject, None, "hello there").await;

        assert!(find_in_subject(&db, subject, comment.id).await.unwrap().is_some());
        assert!(find_in_subject(&db, other, comment.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_current_body_follows_latest_version() {
        let db = test_utils::setup_test_db().await;
        let comment = insert(&db, Subject::Mod(ModId::new()), None, "first").await;

        let later = Utc::now() + Duration::seconds(5);
        let second = append_version(&db, comment.id, "second".to_string(), later)
            .await
            .unwrap();
        append_version(&db, comment.id, "third".to_string(), later)
            .await
            .unwrap();

        assert_eq!(second.version_number, 2);
        assert_eq!(current_body(&db, comment.id).await.unwrap().unwrap(), "third");

        let numbers: Vec<i32> = versions(&db, comment.id)
            .await
            .unwrap()
            .iter()
            .map(|version| version.version_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);

        let edited = find(&db, comment.id).await.unwrap().unwrap();
        assert!(edited.edited_at.is_some());

        let bodies = current_bodies(&db, &[comment.id]).await.unwrap();
        assert_eq!(bodies[&comment.id], "third");
    }

    #[tokio::test]
    async fn test_duplicate_version_number_is_rejected() {
        let db = test_utils::setup_test_db().await;
        let comment = insert(&db, Subject::Mod(ModId::new()), None, "first").await;

        let duplicate = CommentVersionActiveModel {
            id: Set(VersionId::new()),
            comment_id: Set(comment.id),
            version_number: Set(1),
            body: Set("racing edit".to_string()),
            created_at: Set(Utc::now()),
        };
        assert!(CommentVersion::insert(duplicate).exec(&db).await.is_err());
    }

    #[tokio::test]
    async fn test_soft_delete_and_restore_leave_children_alone() {
        let db = test_utils::setup_test_db().await;
        let subject = Subject::Mod(ModId::new());
        let root = insert(&db, subject, None, "root comment").await;
        let reply = insert(&db, subject, Some(&root), "a reply").await;
        let moderator = UserId::new();

        assert!(soft_delete(&db, root.id, moderator, Utc::now()).await.unwrap());
        assert!(!soft_delete(&db, root.id, moderator, Utc::now()).await.unwrap());

        let deleted = find(&db, root.id).await.unwrap().unwrap();
        assert!(deleted.is_deleted());
        assert_eq!(deleted.deleted_by, Some(moderator));

        let child = find(&db, reply.id).await.unwrap().unwrap();
        assert!(!child.is_deleted());

        assert!(restore(&db, root.id).await.unwrap());
        assert!(!restore(&db, root.id).await.unwrap());
        let restored = find(&db, root.id).await.unwrap().unwrap();
        assert_eq!(restored.deleted_at, None);
        assert_eq!(restored.deleted_by, None);
    }

    #[tokio::test]
    async fn test_surviving_descendants_ignores_deleted() {
        let db = test_utils::setup_test_db().await;
        let subject = Subject::Mod(ModId::new());
        let root = insert(&db, subject, None, "root comment").await;
        let reply = insert(&db, subject, Some(&root), "a reply").await;
        let nested = insert(&db, subject, Some(&reply), "nested").await;

        assert_eq!(surviving_descendants(&db, &root).await.unwrap(), 2);

        soft_delete(&db, nested.id, UserId::new(), Utc::now()).await.unwrap();
        assert_eq!(surviving_descendants(&db, &root).await.unwrap(), 1);
        assert_eq!(surviving_descendants(&db, &reply).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_hard_delete_root_removes_whole_thread() {
        let db = test_utils::setup_test_db().await;
        let subject = Subject::Mod(ModId::new());
        let root = insert(&db, subject, None, "root comment").await;
        let reply = insert(&db, subject, Some(&root), "a reply").await;
        insert(&db, subject, Some(&reply), "nested").await;
        let neighbour = insert(&db, subject, None, "another thread").await;

        let removed = hard_delete_subtree(&db, root.clone()).await.unwrap();
        assert_eq!(removed.len(), 3);
        assert_eq!(removed[0], root.id);

        let remaining = Comment::find().all(&db).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, neighbour.id);

        let versions_left = CommentVersion::find().count(&db).await.unwrap();
        assert_eq!(versions_left, 1);
    }

    #[tokio::test]
    async fn test_hard_delete_reply_keeps_siblings_and_root() {
        let db = test_utils::setup_test_db().await;
        let subject = Subject::Mod(ModId::new());
        let root = insert(&db, subject, None, "root comment").await;
        let doomed = insert(&db, subject, Some(&root), "doomed reply").await;
        insert(&db, subject, Some(&doomed), "doomed child").await;
        let sibling = insert(&db, subject, Some(&root), "sibling reply").await;

        let removed = hard_delete_subtree(&db, doomed).await.unwrap();
        assert_eq!(removed.len(), 2);

        assert!(find(&db, root.id).await.unwrap().is_some());
        assert!(find(&db, sibling.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_parent_with_children_cannot_be_removed_directly() {
        let db = test_utils::setup_test_db().await;
        let subject = Subject::Mod(ModId::new());
        let root = insert(&db, subject, None, "root comment").await;
        insert(&db, subject, Some(&root), "a reply").await;

        // the schema refuses to orphan the reply
        assert!(Comment::delete_by_id(root.id).exec(&db).await.is_err());
    }
}
