use chrono::{DateTime, Utc};

/// Source of "now" for every time-dependent rule (delete window, rate
/// limit, task scheduling).
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
