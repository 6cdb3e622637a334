use serde::Serialize;
use tokio::sync::broadcast;

use crate::{
    entity::prelude::SpamStatus,
    ids::{CommentId, UserId},
    subject::Subject,
};

const DEFAULT_CAPACITY: usize = 256;

/// Something changed about a comment. Consumed by whatever pushes updates
/// to clients; nothing inside the crate depends on delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CommentEvent {
    Created {
        comment_id: CommentId,
        subject: Subject,
        parent_id: Option<CommentId>,
    },
    Updated {
        comment_id: CommentId,
        subject: Subject,
        version_number: i32,
    },
    SoftDeleted {
        comment_id: CommentId,
        subject: Subject,
    },
    HardDeleted {
        comment_ids: Vec<CommentId>,
        subject: Subject,
    },
    Restored {
        comment_id: CommentId,
        subject: Subject,
    },
    PinChanged {
        comment_id: CommentId,
        subject: Subject,
        pinned: bool,
    },
    SpamStatusChanged {
        comment_id: CommentId,
        subject: Subject,
        status: SpamStatus,
    },
    ReactionToggled {
        comment_id: CommentId,
        user_id: UserId,
        liked: bool,
    },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CommentEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CommentEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: CommentEvent) {
        // no subscribers is fine
        if self.sender.send(event).is_err() {
            tracing::trace!("comment event dropped, no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ModId;

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let event = CommentEvent::Restored {
            comment_id: CommentId::new(),
            subject: Subject::Mod(ModId::new()),
        };
        bus.publish(event.clone());

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.publish(CommentEvent::ReactionToggled {
            comment_id: CommentId::new(),
            user_id: UserId::new(),
            liked: true,
        });
    }
}
