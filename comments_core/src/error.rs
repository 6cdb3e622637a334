use sea_orm::DbErr;
use thiserror::Error;

use crate::{config::ConfigError, validation::ValidationError};

/// Failure to bring the runtime up.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("failed to load config")]
    Config(#[from] ConfigError),

    #[error("data store unavailable")]
    Database(#[from] DbErr),
}

/// Error surfaced by every public comment operation.
///
/// `Forbidden` deliberately carries no detail. The one exception is
/// `RateLimited`, which tells the caller how long to wait.
#[derive(Debug, Error)]
pub enum CommentError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("you are not allowed to do that")]
    Forbidden,

    #[error("you are commenting too fast, try again in {remaining_secs} seconds")]
    RateLimited { remaining_secs: u64 },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("fatal database error")]
    Database(#[from] DbErr),

    #[error("malformed stored payload")]
    Serialization(#[from] serde_json::Error),
}

impl CommentError {
    /// Rate limiting is an authorization failure with a countdown attached.
    pub fn is_forbidden(&self) -> bool {
        matches!(
            self,
            CommentError::Forbidden | CommentError::RateLimited { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CommentError::NotFound(_))
    }

    /// Field the error can be attributed to, for inline display.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            CommentError::Validation(error) => Some(error.field),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_is_forbidden_with_countdown() {
        let error = CommentError::RateLimited { remaining_secs: 20 };
        assert!(error.is_forbidden());
        assert!(error.to_string().contains("20 seconds"));
    }

    #[test]
    fn test_forbidden_does_not_leak_reason() {
        assert_eq!(
            CommentError::Forbidden.to_string(),
            "you are not allowed to do that"
        );
        assert_eq!(CommentError::Forbidden.field(), None);
    }
}
