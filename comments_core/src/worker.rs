use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    actor::RequestContext,
    entity::prelude::*,
    error::CommentError,
    queue,
    service::{
        notifications::{DispatchOutcome, Notifier},
        ServiceContext,
    },
    spam::SpamEngine,
};

/// Tasks stuck in `processing` longer than this are assumed orphaned.
const STALE_AFTER_SECS: i64 = 600;

/// What became of one task.
enum TaskResult {
    Done,
    Deferred(Duration),
    Failed(String),
}

/// Background consumer of the task queue: spam checks and notification
/// dispatch.
#[derive(Clone)]
pub struct Worker {
    ctx: ServiceContext,
    spam: SpamEngine,
    notifier: Notifier,
}

impl Worker {
    pub fn new(ctx: ServiceContext, spam: SpamEngine, notifier: Notifier) -> Self {
        Self {
            ctx,
            spam,
            notifier,
        }
    }

    /// Claims and processes one batch of due tasks. Returns how many were
    /// processed.
    pub async fn run_once(&self) -> Result<usize, DbErr> {
        let now = self.ctx.clock.now();
        let batch_size = self.ctx.config.worker.batch_size;
        let tasks = queue::claim_due(&self.ctx.db, now, batch_size).await?;

        for task in &tasks {
            let result = self.process(task).await;
            let now = self.ctx.clock.now();

            match result {
                TaskResult::Done => queue::complete(&self.ctx.db, task.id, now).await?,
                TaskResult::Deferred(delay) => {
                    debug!(task_id = %task.id, "task deferred");
                    queue::reschedule(&self.ctx.db, task.id, now + delay, now).await?
                }
                TaskResult::Failed(reason) => {
                    let backoff = queue::backoff(
                        self.ctx.config.worker.retry_backoff_secs,
                        task.attempts,
                    );
                    let status = queue::fail(&self.ctx.db, task, &reason, now + backoff, now).await?;
                    if status == TaskStatus::Failed {
                        error!(task_id = %task.id, kind = ?task.kind, %reason, "task failed permanently");
                        if task.kind == TaskKind::SpamCheck {
                            if let Err(error) = self.spam.fail_open(task.comment_id, &reason).await {
                                error!(comment_id = %task.comment_id, %error, "could not publish comment after failed spam check");
                            }
                        }
                    } else {
                        warn!(task_id = %task.id, kind = ?task.kind, %reason, "task failed, will retry");
                    }
                }
            }
        }

        Ok(tasks.len())
    }

    async fn process(&self, task: &TaskModel) -> TaskResult {
        match task.kind {
            TaskKind::SpamCheck => {
                let request = match queue::decode_payload::<RequestContext>(task) {
                    Ok(request) => request.unwrap_or_default(),
                    Err(error) => return TaskResult::Failed(CommentError::from(error).to_string()),
                };
                match self.spam.classify(task.comment_id, &request).await {
                    Ok(_) => TaskResult::Done,
                    Err(error) => TaskResult::Failed(error.to_string()),
                }
            }
            TaskKind::Notify => match self.notifier.dispatch(task.comment_id).await {
                Ok(report) if report.outcome == DispatchOutcome::Deferred => {
                    let delay = self.ctx.config.notifications.delay_secs as i64;
                    TaskResult::Deferred(Duration::seconds(delay))
                }
                Ok(report) if report.failed > 0 => {
                    TaskResult::Failed(format!("{} notification(s) not delivered", report.failed))
                }
                Ok(_) => TaskResult::Done,
                Err(error) => TaskResult::Failed(error.to_string()),
            },
        }
    }

    /// Polls the queue until `token` is cancelled.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let poll = StdDuration::from_millis(self.ctx.config.worker.poll_interval_ms);
            let mut interval = tokio::time::interval(poll);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            let cutoff = self.ctx.clock.now() - Duration::seconds(STALE_AFTER_SECS);
            if let Err(error) = queue::requeue_stale(&self.ctx.db, cutoff).await {
                warn!(%error, "failed to requeue stale tasks");
            }

            info!(poll_interval_ms = poll.as_millis() as u64, "worker started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        // keep going while there is a backlog
                        loop {
                            match self.run_once().await {
                                Ok(0) => break,
                                Ok(processed) => debug!(processed, "worker batch done"),
                                Err(error) => {
                                    error!(%error, "worker batch failed");
                                    break;
                                }
                            }
                            if token.is_cancelled() {
                                break;
                            }
                        }
                    }
                }
            }
            info!("worker stopped");
        })
    }
}
