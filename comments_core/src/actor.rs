use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Site roles, as handed to us by the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Banned,
    Member,
    Contributor,
    Supporter,
    Translator,
    Tester,
    Curator,
    Moderator,
    SuperModerator,
    Administrator,
    Owner,
}

/// Coarse classification used by the policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RoleTier {
    Regular,
    Moderator,
    Administrator,
}

impl Role {
    pub fn tier(self) -> RoleTier {
        match self {
            Role::Moderator | Role::SuperModerator => RoleTier::Moderator,
            Role::Administrator | Role::Owner => RoleTier::Administrator,
            _ => RoleTier::Regular,
        }
    }

    /// Moderators and administrators.
    pub fn is_moderator_tier(self) -> bool {
        self.tier() >= RoleTier::Moderator
    }

    pub fn is_administrator(self) -> bool {
        self.tier() == RoleTier::Administrator
    }
}

/// An authenticated caller. Guests are represented as `None` wherever an
/// `Option<&Actor>` is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
    pub email_verified: bool,
}

impl Actor {
    pub fn new(id: UserId, role: Role) -> Self {
        Self {
            id,
            role,
            email_verified: true,
        }
    }

    pub fn unverified(mut self) -> Self {
        self.email_verified = false;
        self
    }
}

/// Where a write came from. Stored with the spam-check task so the
/// classifier sees the original request, not the worker's.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub permalink: Option<String>,
}
