use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_util::sync::CancellationToken;

pub mod actor;
pub mod clock;
pub mod config;
pub mod directory;
pub mod entity;
pub mod error;
pub mod events;
pub mod ids;
pub mod locks;
pub mod log_detector;
pub mod models;
pub mod policy;
pub mod queue;
pub mod rate_limit;
pub mod service;
pub mod spam;
pub mod subject;
pub mod validation;
pub mod worker;

#[cfg(test)]
mod test_utils;


use crate::{
    clock::{Clock, SystemClock},
    config::CommentsConfig,
    directory::Directory,
    error::StartError,
    events::{CommentEvent, EventBus},
    service::{
        notifications::{NotificationSink, Notifier},
        CommentsService, ModerationService, ServiceContext,
    },
    spam::{SpamClassifier, SpamEngine},
    worker::Worker,
};

/// Main runtime handle: the services plus the background worker.
pub struct CommentsCore {
    pub config: Arc<CommentsConfig>,
    pub db: DatabaseConnection,

    pub comments: CommentsService,
    pub moderation: ModerationService,
    pub spam: SpamEngine,
    pub notifier: Notifier,

    events: EventBus,
    shutdown: CancellationToken,
    worker: JoinHandle<()>,
}

impl CommentsCore {
    /// Opens (and migrates) the database named by `config`, builds the
    /// classifier it describes and starts the worker.
    pub async fn start(
        config: CommentsConfig,
        directory: Arc<dyn Directory>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, StartError> {
        let db = models::open_or_create_db(&config).await?;
        models::migrate_up(&db).await?;

        let classifier = spam::classifier_from_config(&config.spam);
        Ok(Self::start_with(config, db, directory, sink, classifier, Arc::new(SystemClock)))
    }

    /// Like [`CommentsCore::start`] with every collaborator supplied. The
    /// database must already be migrated.
    pub fn start_with(
        config: CommentsConfig,
        db: DatabaseConnection,
        directory: Arc<dyn Directory>,
        sink: Arc<dyn NotificationSink>,
        classifier: Arc<dyn SpamClassifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = Arc::new(config);
        let events = EventBus::default();

        let ctx = ServiceContext {
            db: db.clone(),
            config: config.clone(),
            directory,
            clock,
            events: events.clone(),
        };

        let comments = CommentsService::new(ctx.clone());
        let moderation = ModerationService::new(ctx.clone());
        let spam = SpamEngine::new(ctx.clone(), classifier);
        let notifier = Notifier::new(ctx.clone(), sink);

        let shutdown = CancellationToken::new();
        let worker = Worker::new(ctx, spam.clone(), notifier.clone()).spawn(shutdown.clone());

        tracing::info!(database = %config.database_path.display(), "comments core started");

        Self {
            config,
            db,
            comments,
            moderation,
            spam,
            notifier,
            events,
            shutdown,
            worker,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CommentEvent> {
        self.events.subscribe()
    }

    /// Stops the worker after its current batch and closes the database.
    pub async fn shutdown(self) -> Result<(), sea_orm::DbErr> {
        self.shutdown.cancel();
        if let Err(error) = self.worker.await {
            tracing::error!(%error, "worker task panicked");
        }
        self.db.close().await
    }
}

pub mod prelude {
    pub use super::actor::{Actor, RequestContext, Role};
    pub use super::directory::{Directory, EmailPreferences, UserInfo};
    pub use super::error::CommentError;
    pub use super::events::CommentEvent;
    pub use super::ids;
    pub use super::service::comments::{CommentBody, CommentView, HydratedComment, Page};
    pub use super::service::moderation::DeleteOutcome;
    pub use super::service::notifications::{NotificationSink, OutgoingNotification, TracingSink};
    pub use super::spam::SpamClassifier;
    pub use super::subject::{Subject, SubjectInfo};
    pub use super::CommentsCore;
}
