use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{ModId, UserId};

/// Discriminator column for the polymorphic subject reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum SubjectKind {
    #[sea_orm(string_value = "mod")]
    Mod,
    #[sea_orm(string_value = "user")]
    Profile,
}

/// The thing a comment thread (or a subscription) hangs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Subject {
    Mod(ModId),
    Profile(UserId),
}

impl Subject {
    pub fn kind(&self) -> SubjectKind {
        match self {
            Subject::Mod(_) => SubjectKind::Mod,
            Subject::Profile(_) => SubjectKind::Profile,
        }
    }

    pub fn raw_id(&self) -> Uuid {
        match self {
            Subject::Mod(id) => id.into_uuid(),
            Subject::Profile(id) => id.into_uuid(),
        }
    }

    /// Rebuilds a subject from its persisted column pair.
    pub fn from_parts(kind: SubjectKind, id: Uuid) -> Self {
        match kind {
            SubjectKind::Mod => Subject::Mod(ModId::from_uuid(id)),
            SubjectKind::Profile => Subject::Profile(UserId::from_uuid(id)),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Mod(id) => write!(f, "mod:{id}"),
            Subject::Profile(id) => write!(f, "user:{id}"),
        }
    }
}

/// What the core needs to know about a subject. Supplied by the
/// [`Directory`](crate::directory::Directory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectInfo {
    pub subject: Subject,
    pub owner: UserId,
    pub co_authors: Vec<UserId>,
    pub published: bool,
    pub comments_disabled: bool,
    pub display_name: String,
}

impl SubjectInfo {
    pub fn can_receive_comments(&self) -> bool {
        self.published && !self.comments_disabled
    }

    /// Owner or one of the additional authors.
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner == user_id || self.co_authors.contains(&user_id)
    }
}
