//! Durable background work, stored in the `task` table.
//!
//! Delivery is at-least-once: a task is claimed (`pending → processing`)
//! before it runs, and a worker that dies mid-task leaves it in
//! `processing` until [`requeue_stale`] hands it out again. Handlers must
//! therefore be idempotent.

use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    entity::prelude::*,
    ids::{CommentId, TaskId},
};

/// Adds a task due at `run_at`.
pub async fn enqueue<C, P>(
    db: &C,
    kind: TaskKind,
    comment_id: CommentId,
    payload: Option<&P>,
    run_at: DateTime<Utc>,
    max_attempts: i32,
    now: DateTime<Utc>,
) -> Result<TaskModel, DbErr>
where
    C: ConnectionTrait,
    P: Serialize,
{
    let payload = payload
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| DbErr::Custom(format!("unserializable task payload: {e}")))?;

    let task = TaskActiveModel {
        id: Set(TaskId::new()),
        kind: Set(kind),
        comment_id: Set(comment_id),
        payload: Set(payload),
        run_at: Set(run_at),
        status: Set(TaskStatus::Pending),
        attempts: Set(0),
        max_attempts: Set(max_attempts),
        last_error: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let task = Task::insert(task).exec_with_returning(db).await?;
    tracing::debug!(task_id = %task.id, kind = ?kind, %comment_id, %run_at, "task enqueued");
    Ok(task)
}

/// Claims up to `limit` due tasks, oldest due first. Each claim is a
/// conditional update, so two claimers never get the same task.
pub async fn claim_due(
    db: &DatabaseConnection,
    now: DateTime<Utc>,
    limit: u64,
) -> Result<Vec<TaskModel>, DbErr> {
    let txn = db.begin().await?;

    let due = Task::find()
        .filter(TaskColumn::Status.eq(TaskStatus::Pending))
        .filter(TaskColumn::RunAt.lte(now))
        .order_by_asc(TaskColumn::RunAt)
        .order_by_asc(TaskColumn::Id)
        .limit(limit)
        .all(&txn)
        .await?;

    let mut claimed = Vec::with_capacity(due.len());
    for mut task in due {
        let result = Task::update_many()
            .col_expr(TaskColumn::Status, Expr::value(TaskStatus::Processing))
            .col_expr(TaskColumn::UpdatedAt, Expr::value(now))
            .filter(TaskColumn::Id.eq(task.id))
            .filter(TaskColumn::Status.eq(TaskStatus::Pending))
            .exec(&txn)
            .await?;

        if result.rows_affected == 1 {
            task.status = TaskStatus::Processing;
            task.updated_at = now;
            claimed.push(task);
        }
    }

    txn.commit().await?;
    Ok(claimed)
}

pub async fn complete<C>(db: &C, task_id: TaskId, now: DateTime<Utc>) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    Task::update_many()
        .col_expr(TaskColumn::Status, Expr::value(TaskStatus::Done))
        .col_expr(TaskColumn::UpdatedAt, Expr::value(now))
        .filter(TaskColumn::Id.eq(task_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Puts a task back without counting an attempt. Used when the task ran
/// fine but its precondition is not met yet.
pub async fn reschedule<C>(
    db: &C,
    task_id: TaskId,
    run_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    Task::update_many()
        .col_expr(TaskColumn::Status, Expr::value(TaskStatus::Pending))
        .col_expr(TaskColumn::RunAt, Expr::value(run_at))
        .col_expr(TaskColumn::UpdatedAt, Expr::value(now))
        .filter(TaskColumn::Id.eq(task_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Records a failed attempt. The task goes back to `pending` at `retry_at`
/// until it has used up `max_attempts`, then stays `failed`.
pub async fn fail<C>(
    db: &C,
    task: &TaskModel,
    error: &str,
    retry_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<TaskStatus, DbErr>
where
    C: ConnectionTrait,
{
    let attempts = task.attempts + 1;
    let status = if attempts >= task.max_attempts {
        TaskStatus::Failed
    } else {
        TaskStatus::Pending
    };

    Task::update_many()
        .col_expr(TaskColumn::Status, Expr::value(status))
        .col_expr(TaskColumn::Attempts, Expr::value(attempts))
        .col_expr(TaskColumn::LastError, Expr::value(Some(error.to_string())))
        .col_expr(TaskColumn::RunAt, Expr::value(retry_at))
        .col_expr(TaskColumn::UpdatedAt, Expr::value(now))
        .filter(TaskColumn::Id.eq(task.id))
        .exec(db)
        .await?;

    Ok(status)
}

/// Returns tasks stuck in `processing` since before `cutoff` to the queue.
pub async fn requeue_stale<C>(db: &C, cutoff: DateTime<Utc>) -> Result<u64, DbErr>
where
    C: ConnectionTrait,
{
    let result = Task::update_many()
        .col_expr(TaskColumn::Status, Expr::value(TaskStatus::Pending))
        .filter(TaskColumn::Status.eq(TaskStatus::Processing))
        .filter(TaskColumn::UpdatedAt.lt(cutoff))
        .exec(db)
        .await?;

    if result.rows_affected > 0 {
        tracing::warn!(count = result.rows_affected, "requeued stale tasks");
    }
    Ok(result.rows_affected)
}

/// All tasks about one comment, oldest first.
pub async fn tasks_for<C>(db: &C, comment_id: CommentId) -> Result<Vec<TaskModel>, DbErr>
where
    C: ConnectionTrait,
{
    Task::find()
        .filter(TaskColumn::CommentId.eq(comment_id))
        .order_by_asc(TaskColumn::Id)
        .all(db)
        .await
}

pub fn decode_payload<P>(task: &TaskModel) -> Result<Option<P>, serde_json::Error>
where
    P: DeserializeOwned,
{
    task.payload
        .clone()
        .map(serde_json::from_value)
        .transpose()
}

pub fn backoff(base_secs: u64, attempts: i32) -> Duration {
    // 1x, 2x, 4x ... capped at 64x
    let factor = 1i64 << attempts.clamp(0, 6);
    Duration::seconds(base_secs as i64 * factor)
}
