//! Fixtures shared by the crate's tests: a migrated in-memory database,
//! a clock you can move, an in-memory directory, and scripted stand-ins
//! for the classifier and the notification sink.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

use crate::{
    actor::{Actor, Role},
    clock::Clock,
    config::{CommentsConfig, Environment},
    directory::{Directory, EmailPreferences, UserInfo},
    events::EventBus,
    ids::{ModId, UserId},
    models::migrator::Migrator,
    service::{
        notifications::{DeliveryError, NotificationSink, OutgoingNotification},
        CommentsService, ModerationService, Notifier, ServiceContext,
    },
    spam::{CheckRequest, ClassifierError, SpamClassifier, SpamEngine, UsageLimit, Verdict},
    subject::{Subject, SubjectInfo},
    worker::Worker,
};

/// Fresh in-memory database with every migration applied.
pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    db
}

pub fn test_config() -> CommentsConfig {
    let mut config = CommentsConfig::new(&std::env::temp_dir());
    config.environment = Environment::Testing;
    config
}

#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    subjects: Mutex<HashMap<Subject, SubjectInfo>>,
    users: Mutex<HashMap<UserId, UserInfo>>,
}

impl InMemoryDirectory {
    pub fn add_user(&self, role: Role) -> Actor {
        let id = UserId::new();
        let user = UserInfo {
            id,
            role,
            display_name: format!("user-{}", &id.to_string()[..8]),
            email: Some(format!("{id}@example.org")),
            email_verified: true,
            email_preferences: EmailPreferences {
                replies: true,
                subscriptions: true,
            },
        };
        let actor = user.as_actor();
        self.insert_user(user);
        actor
    }

    pub fn insert_user(&self, user: UserInfo) {
        self.users.lock().unwrap().insert(user.id, user);
    }

    pub fn update_user(&self, id: UserId, update: impl FnOnce(&mut UserInfo)) {
        if let Some(user) = self.users.lock().unwrap().get_mut(&id) {
            update(user);
        }
    }

    /// A published mod with comments enabled.
    pub fn add_mod(&self, owner: UserId) -> Subject {
        let subject = Subject::Mod(ModId::new());
        self.insert_subject(SubjectInfo {
            subject,
            owner,
            co_authors: vec![],
            published: true,
            comments_disabled: false,
            display_name: "Better Textures".to_string(),
        });
        subject
    }

    pub fn insert_subject(&self, info: SubjectInfo) {
        self.subjects.lock().unwrap().insert(info.subject, info);
    }

    pub fn update_subject(&self, subject: Subject, update: impl FnOnce(&mut SubjectInfo)) {
        if let Some(info) = self.subjects.lock().unwrap().get_mut(&subject) {
            update(info);
        }
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn subject(&self, subject: Subject) -> Option<SubjectInfo> {
        self.subjects.lock().unwrap().get(&subject).cloned()
    }

    async fn user(&self, user_id: UserId) -> Option<UserInfo> {
        self.users.lock().unwrap().get(&user_id).cloned()
    }
}

/// Keeps every delivered notification; can be told to fail for some users.
#[derive(Debug, Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<OutgoingNotification>>,
    failing: Mutex<HashSet<UserId>>,
}

impl RecordingSink {
    pub fn fail_for(&self, user_id: UserId) {
        self.failing.lock().unwrap().insert(user_id);
    }

    pub fn recover(&self, user_id: UserId) {
        self.failing.lock().unwrap().remove(&user_id);
    }

    pub fn delivered(&self) -> Vec<OutgoingNotification> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn delivered_to(&self, user_id: UserId) -> Vec<OutgoingNotification> {
        self.delivered()
            .into_iter()
            .filter(|notification| notification.recipient_id == user_id)
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, notification: &OutgoingNotification) -> Result<(), DeliveryError> {
        if self.failing.lock().unwrap().contains(&notification.recipient_id) {
            return Err(DeliveryError("mailer down".to_string()));
        }
        self.delivered.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Classifier that answers from a script, then falls back to ham.
#[derive(Debug, Default)]
pub struct ScriptedClassifier {
    script: Mutex<VecDeque<Result<Verdict, ClassifierError>>>,
    checks: AtomicUsize,
    feedback: Mutex<Vec<(&'static str, CheckRequest)>>,
    key_rejected: AtomicBool,
}

impl ScriptedClassifier {
    pub fn push(&self, answer: Result<Verdict, ClassifierError>) {
        self.script.lock().unwrap().push_back(answer);
    }

    pub fn reject_key(&self) {
        self.key_rejected.store(true, Ordering::SeqCst);
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn feedback(&self) -> Vec<(&'static str, CheckRequest)> {
        self.feedback.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpamClassifier for ScriptedClassifier {
    async fn check(&self, _request: &CheckRequest) -> Result<Verdict, ClassifierError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Verdict::ham("1.1")))
    }

    async fn verify_key(&self) -> Result<bool, ClassifierError> {
        Ok(!self.key_rejected.load(Ordering::SeqCst))
    }

    async fn submit_spam(&self, request: &CheckRequest) -> Result<(), ClassifierError> {
        self.feedback.lock().unwrap().push(("spam", request.clone()));
        Ok(())
    }

    async fn submit_ham(&self, request: &CheckRequest) -> Result<(), ClassifierError> {
        self.feedback.lock().unwrap().push(("ham", request.clone()));
        Ok(())
    }

    async fn usage_limit(&self) -> Result<UsageLimit, ClassifierError> {
        Ok(UsageLimit {
            limit: Some(1000),
            usage: 10,
            percentage: 1.0,
            throttled: false,
        })
    }
}

/// Every service wired to in-memory fakes.
pub struct Harness {
    pub db: DatabaseConnection,
    pub clock: Arc<ManualClock>,
    pub directory: Arc<InMemoryDirectory>,
    pub sink: Arc<RecordingSink>,
    pub classifier: Arc<ScriptedClassifier>,
    pub events: EventBus,
    pub comments: CommentsService,
    pub moderation: ModerationService,
    pub spam: SpamEngine,
    pub notifier: Notifier,
    pub worker: Worker,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: CommentsConfig) -> Self {
        let db = setup_test_db().await;
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let directory = Arc::new(InMemoryDirectory::default());
        let sink = Arc::new(RecordingSink::default());
        let classifier = Arc::new(ScriptedClassifier::default());
        let events = EventBus::default();

        let ctx = ServiceContext {
            db: db.clone(),
            config: Arc::new(config),
            directory: directory.clone(),
            clock: clock.clone(),
            events: events.clone(),
        };

        let comments = CommentsService::new(ctx.clone());
        let moderation = ModerationService::new(ctx.clone());
        let spam = SpamEngine::new(ctx.clone(), classifier.clone());
        let notifier = Notifier::new(ctx.clone(), sink.clone());
        let worker = Worker::new(ctx, spam.clone(), notifier.clone());

        Self {
            db,
            clock,
            directory,
            sink,
            classifier,
            events,
            comments,
            moderation,
            spam,
            notifier,
            worker,
        }
    }

    /// Runs the worker until nothing is due right now.
    pub async fn drain(&self) -> usize {
        let mut total = 0;
        loop {
            let processed = self.worker.run_once().await.expect("worker run failed");
            if processed == 0 {
                return total;
            }
            total += processed;
        }
    }
}
