use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Everything the classifier gets to see about a comment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CheckRequest {
    pub body: String,
    pub author_name: String,
    pub author_email: Option<String>,
    pub user_ip: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub permalink: Option<String>,
    /// Set outside production so the vendor does not learn from test traffic.
    pub is_test: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub spam: bool,
    /// Blatant spam the vendor recommends dropping without review.
    pub discard: bool,
    pub api_version: String,
}

impl Verdict {
    pub fn ham(api_version: impl Into<String>) -> Self {
        Self {
            spam: false,
            discard: false,
            api_version: api_version.into(),
        }
    }

    pub fn spam(api_version: impl Into<String>) -> Self {
        Self {
            spam: true,
            discard: false,
            api_version: api_version.into(),
        }
    }

    pub fn discard(api_version: impl Into<String>) -> Self {
        Self {
            spam: true,
            discard: true,
            api_version: api_version.into(),
        }
    }
}

/// Account usage as reported by the vendor. `limit` is `None` for
/// unmetered plans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageLimit {
    pub limit: Option<u64>,
    pub usage: u64,
    pub percentage: f64,
    pub throttled: bool,
}

/// Classifier failures. None of these reach callers: the engine fails open.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassifierError {
    #[error("spam classification is disabled")]
    Disabled,
    #[error("classifier rejected the api key")]
    InvalidKey,
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
    #[error("classifier timed out")]
    Timeout,
}

#[async_trait]
pub trait SpamClassifier: Send + Sync {
    async fn check(&self, request: &CheckRequest) -> Result<Verdict, ClassifierError>;

    async fn verify_key(&self) -> Result<bool, ClassifierError>;

    /// Feedback: the vendor let this through but it is spam.
    async fn submit_spam(&self, request: &CheckRequest) -> Result<(), ClassifierError>;

    /// Feedback: the vendor flagged this but it is fine.
    async fn submit_ham(&self, request: &CheckRequest) -> Result<(), ClassifierError>;

    async fn usage_limit(&self) -> Result<UsageLimit, ClassifierError>;
}

/// Stand-in used when no classifier is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledClassifier;

#[async_trait]
impl SpamClassifier for DisabledClassifier {
    async fn check(&self, _request: &CheckRequest) -> Result<Verdict, ClassifierError> {
        Err(ClassifierError::Disabled)
    }

    async fn verify_key(&self) -> Result<bool, ClassifierError> {
        Err(ClassifierError::Disabled)
    }

    async fn submit_spam(&self, _request: &CheckRequest) -> Result<(), ClassifierError> {
        Err(ClassifierError::Disabled)
    }

    async fn submit_ham(&self, _request: &CheckRequest) -> Result<(), ClassifierError> {
        Err(ClassifierError::Disabled)
    }

    async fn usage_limit(&self) -> Result<UsageLimit, ClassifierError> {
        Err(ClassifierError::Disabled)
    }
}
