use std::fmt;

use thiserror::Error;

use crate::{config::BodyLimits, log_detector};

/// Where pasted logs should go instead.
pub const PASTE_SERVICE_URL: &str = "https://paste.gg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    TooShort { min: usize },
    TooLong { max: usize },
    LogContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ValidationError {
    pub field: &'static str,
    pub kind: ValidationErrorKind,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ValidationErrorKind::TooShort { min } => {
                write!(f, "The {} must be at least {min} characters.", self.field)
            }
            ValidationErrorKind::TooLong { max } => {
                write!(f, "The {} may not be greater than {max} characters.", self.field)
            }
            ValidationErrorKind::LogContent => write!(
                f,
                "It looks like you pasted a log. Please upload it to {PASTE_SERVICE_URL} and share the link instead."
            ),
        }
    }
}

/// Trims `raw` and checks it against the body rules. Returns the body that
/// should be stored.
pub fn validate_body(raw: &str, limits: &BodyLimits) -> Result<String, ValidationError> {
    let body = raw.trim();
    let length = body.chars().count();

    let kind = if length < limits.min_chars {
        Some(ValidationErrorKind::TooShort {
            min: limits.min_chars,
        })
    } else if length > limits.max_chars {
        Some(ValidationErrorKind::TooLong {
            max: limits.max_chars,
        })
    } else if log_detector::looks_like_log(body) {
        Some(ValidationErrorKind::LogContent)
    } else {
        None
    };

    match kind {
        Some(kind) => Err(ValidationError {
            field: "content",
            kind,
        }),
        None => Ok(body.to_string()),
    }
}
