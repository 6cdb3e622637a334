use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    actor::{Actor, Role},
    ids::UserId,
    subject::{Subject, SubjectInfo},
};

/// Per-category email opt-ins. The in-app (database) record is always
/// written regardless of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmailPreferences {
    pub replies: bool,
    pub subscriptions: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub id: UserId,
    pub role: Role,
    pub display_name: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub email_preferences: EmailPreferences,
}

impl UserInfo {
    pub fn as_actor(&self) -> Actor {
        Actor {
            id: self.id,
            role: self.role,
            email_verified: self.email_verified,
        }
    }
}

/// Lookup of users and commentable subjects owned by the rest of the
/// platform.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn subject(&self, subject: Subject) -> Option<SubjectInfo>;

    async fn user(&self, user_id: UserId) -> Option<UserInfo>;

    /// Role of a user, `Member` when unknown.
    async fn role_of(&self, user_id: UserId) -> Role {
        self.user(user_id)
            .await
            .map(|user| user.role)
            .unwrap_or(Role::Member)
    }
}
