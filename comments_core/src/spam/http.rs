//! Client for Akismet-compatible classification services.
//!
//! Requests are form-encoded POSTs answered with plain-text bodies:
//! `comment-check` says `true`/`false` (or `invalid` for a bad key) and may
//! attach an `X-akismet-pro-tip: discard` header, `verify-key` says
//! `valid`/`invalid`, and the feedback endpoints just thank you.

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use super::classifier::{CheckRequest, ClassifierError, SpamClassifier, UsageLimit, Verdict};
use crate::config::SpamConfig;

const API_VERSION: &str = "1.1";
const PRO_TIP_HEADER: &str = "x-akismet-pro-tip";

#[derive(Debug, Clone)]
pub struct HttpClassifier {
    client: reqwest::Client,
    api_key: String,
    site_url: String,
    base_url: String,
    verified_keys: DashMap<String, bool>,
}

impl HttpClassifier {
    pub fn new(config: &SpamConfig) -> Result<Self, ClassifierError> {
        let api_key = config.api_key.clone().ok_or(ClassifierError::Disabled)?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("comments_core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClassifierError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            site_url: config.site_url.clone(),
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            verified_keys: DashMap::new(),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn form(&self, request: &CheckRequest) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("api_key", self.api_key.clone()),
            ("blog", self.site_url.clone()),
            ("comment_type", "comment".to_string()),
            ("comment_author", request.author_name.clone()),
            ("comment_content", request.body.clone()),
        ];

        let optional = [
            ("comment_author_email", &request.author_email),
            ("user_ip", &request.user_ip),
            ("user_agent", &request.user_agent),
            ("referrer", &request.referrer),
            ("permalink", &request.permalink),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                form.push((name, value.clone()));
            }
        }

        if request.is_test {
            form.push(("is_test", "1".to_string()));
        }
        form
    }

    async fn post(
        &self,
        path: &str,
        form: &[(&'static str, String)],
    ) -> Result<reqwest::Response, ClassifierError> {
        let response = self
            .client
            .post(self.url(path))
            .form(form)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        debug!(%status, path, "classifier responded");

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ClassifierError::Unavailable(format!("{path} returned {status}")));
        }
        Ok(response)
    }

    async fn submit(&self, path: &str, request: &CheckRequest) -> Result<(), ClassifierError> {
        let response = self.post(path, &self.form(request)).await?;
        let body = response.text().await.map_err(transport_error)?;

        if body.trim() == "invalid" {
            return Err(ClassifierError::InvalidKey);
        }
        Ok(())
    }
}

fn transport_error(error: reqwest::Error) -> ClassifierError {
    if error.is_timeout() {
        ClassifierError::Timeout
    } else {
        ClassifierError::Unavailable(error.to_string())
    }
}

#[derive(Deserialize)]
struct UsageLimitResponse {
    limit: serde_json::Value,
    usage: u64,
    percentage: serde_json::Value,
    throttled: bool,
}

impl UsageLimitResponse {
    // numbers sometimes arrive as strings, and an unmetered limit is "none"
    fn into_usage_limit(self) -> UsageLimit {
        let limit = match &self.limit {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        };
        let percentage = match &self.percentage {
            serde_json::Value::Number(n) => n.as_f64().unwrap_or_default(),
            serde_json::Value::String(s) => s.parse().unwrap_or_default(),
            _ => 0.0,
        };

        UsageLimit {
            limit,
            usage: self.usage,
            percentage,
            throttled: self.throttled,
        }
    }
}

#[async_trait]
impl SpamClassifier for HttpClassifier {
    async fn check(&self, request: &CheckRequest) -> Result<Verdict, ClassifierError> {
        let response = self
            .post("/1.1/comment-check", &self.form(request))
            .await?;

        let discard = response
            .headers()
            .get(PRO_TIP_HEADER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.eq_ignore_ascii_case("discard"));

        let body = response.text().await.map_err(transport_error)?;
        match body.trim() {
            "true" if discard => Ok(Verdict::discard(API_VERSION)),
            "true" => Ok(Verdict::spam(API_VERSION)),
            "false" => Ok(Verdict::ham(API_VERSION)),
            "invalid" => Err(ClassifierError::InvalidKey),
            other => {
                warn!(body = other, "unexpected comment-check response");
                Err(ClassifierError::Unavailable(format!(
                    "unexpected comment-check response: {other}"
                )))
            }
        }
    }

    async fn verify_key(&self) -> Result<bool, ClassifierError> {
        if let Some(valid) = self.verified_keys.get(&self.api_key) {
            return Ok(*valid);
        }

        let form = [
            ("key", self.api_key.clone()),
            ("blog", self.site_url.clone()),
        ];
        let response = self.post("/1.1/verify-key", &form).await?;
        let body = response.text().await.map_err(transport_error)?;

        let valid = body.trim() == "valid";
        self.verified_keys.insert(self.api_key.clone(), valid);
        Ok(valid)
    }

    async fn submit_spam(&self, request: &CheckRequest) -> Result<(), ClassifierError> {
        self.submit("/1.1/submit-spam", request).await
    }

    async fn submit_ham(&self, request: &CheckRequest) -> Result<(), ClassifierError> {
        self.submit("/1.1/submit-ham", request).await
    }

    async fn usage_limit(&self) -> Result<UsageLimit, ClassifierError> {
        let response = self
            .client
            .get(self.url("/1.2/usage-limit"))
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ClassifierError::InvalidKey);
        }
        if !status.is_success() {
            return Err(ClassifierError::Unavailable(format!("usage-limit returned {status}")));
        }

        let body = response.text().await.map_err(transport_error)?;
        if body.trim() == "invalid" {
            return Err(ClassifierError::InvalidKey);
        }

        serde_json::from_str::<UsageLimitResponse>(&body)
            .map(UsageLimitResponse::into_usage_limit)
            .map_err(|e| ClassifierError::Unavailable(format!("malformed usage-limit response: {e}")))
    }
}
