use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

static DATA_DIR_NAME: &str = "comments_core";
static COMMENTS_DB_NAME: &str = "comments.sqlite";
static CONFIG_FILE_NAME: &str = "config.json";

// data_dir_path
// |- comments_core
//    |- comments.sqlite
//    |- config.json

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no data directory on this platform")]
    NoDataDir,
    #[error("failed to access config file")]
    Io(#[from] std::io::Error),
    #[error("malformed config file")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Production,
    Staging,
    Development,
    Testing,
}

impl Environment {
    /// Non-production traffic is flagged as test traffic to the classifier.
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct BodyLimits {
    pub min_chars: usize,
    pub max_chars: usize,
}

impl Default for BodyLimits {
    fn default() -> Self {
        Self {
            min_chars: 3,
            max_chars: 10_000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// One comment per subject per window for regular users.
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { window_secs: 30 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ModerationConfig {
    /// Young, childless comments inside this window are removed outright.
    pub hard_delete_window_secs: u64,
    pub max_spam_rechecks: i32,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            hard_delete_window_secs: 300,
            max_spam_rechecks: 3,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct NotificationConfig {
    /// Grace period before subscribers hear about a new comment.
    pub delay_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { delay_secs: 60 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SpamConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    /// The `blog` parameter sent with every classifier request.
    pub site_url: String,
    pub endpoint: String,
    pub timeout_ms: u64,
}

impl Default for SpamConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            site_url: "https://localhost".to_string(),
            endpoint: "https://rest.akismet.com".to_string(),
            timeout_ms: 3_000,
        }
    }
}

impl SpamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct WorkerConfig {
    pub poll_interval_ms: u64,
    pub batch_size: u64,
    pub max_attempts: i32,
    pub retry_backoff_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            batch_size: 16,
            max_attempts: 5,
            retry_backoff_secs: 30,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CommentsConfig {
    pub database_path: PathBuf,

    #[serde(default)]
    pub environment: Environment,

    #[serde(default)]
    pub limits: BodyLimits,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub moderation: ModerationConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub spam: SpamConfig,

    #[serde(default)]
    pub worker: WorkerConfig,
}

impl CommentsConfig {
    /// Creates a config with defaults and the database inside `data_dir`.
    pub fn new(data_dir: &Path) -> Self {
        CommentsConfig {
            database_path: data_dir.join(COMMENTS_DB_NAME),
            environment: Environment::default(),
            limits: BodyLimits::default(),
            rate_limit: RateLimitConfig::default(),
            moderation: ModerationConfig::default(),
            notifications: NotificationConfig::default(),
            spam: SpamConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

/// Gets the existing config from the platform data directory or writes a
/// default one.
pub async fn get_or_init() -> Result<CommentsConfig, ConfigError> {
    let data_dir = dirs::data_dir().ok_or(ConfigError::NoDataDir)?;
    load_or_init(&data_dir.join(DATA_DIR_NAME)).await
}

/// Same as [`get_or_init`] but rooted at an explicit directory.
pub async fn load_or_init(dir: &Path) -> Result<CommentsConfig, ConfigError> {
    let config_path = dir.join(CONFIG_FILE_NAME);

    fs::create_dir_all(dir).await?;

    if fs::try_exists(&config_path).await? {
        let mut file = fs::File::open(&config_path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;

        let config: CommentsConfig = serde_json::from_str(&contents)?;
        tracing::debug!(path = %config_path.display(), "loaded config");
        Ok(config)
    } else {
        let config = CommentsConfig::new(dir);

        let json = serde_json::to_string_pretty(&config)?;
        let mut file = fs::File::create(&config_path).await?;
        file.write_all(json.as_bytes()).await?;

        tracing::info!(path = %config_path.display(), "wrote default config");
        Ok(config)
    }
}
