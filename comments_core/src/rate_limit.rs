use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};
use dashmap::{mapref::entry::Entry, DashMap};

use crate::{actor::Actor, error::CommentError, ids::UserId, subject::Subject};

/// A slot handed out by [`RateLimiter::check`]. Give it back with
/// [`RateLimiter::release`] if the write it guarded did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permit {
    user_id: UserId,
    subject: Subject,
    taken_at: DateTime<Utc>,
}

/// One comment per subject per rolling window for regular users.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    last_comment: DashMap<(UserId, Subject), DateTime<Utc>>,
    /// Unix millis after which the next `check` sweeps expired slots.
    next_sweep_ms: AtomicI64,
}

impl RateLimiter {
    pub fn new(window_secs: u64) -> Self {
        Self {
            window: Duration::seconds(window_secs as i64),
            last_comment: DashMap::new(),
            next_sweep_ms: AtomicI64::new(i64::MIN),
        }
    }

    /// Takes a slot for `actor` on `subject`. Moderator-tier actors are never
    /// limited and get no permit.
    pub fn check(
        &self,
        actor: &Actor,
        subject: Subject,
        now: DateTime<Utc>,
    ) -> Result<Option<Permit>, CommentError> {
        if actor.role.is_moderator_tier() {
            return Ok(None);
        }

        self.sweep_if_due(now);

        // the entry guard holds the shard lock, so check and set are atomic
        match self.last_comment.entry((actor.id, subject)) {
            Entry::Occupied(mut entry) => {
                let elapsed = now - *entry.get();
                if elapsed < self.window {
                    let remaining_ms = (self.window - elapsed).num_milliseconds().max(0) as u64;
                    return Err(CommentError::RateLimited {
                        remaining_secs: remaining_ms.div_ceil(1000),
                    });
                }
                entry.insert(now);
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
            }
        }

        Ok(Some(Permit {
            user_id: actor.id,
            subject,
            taken_at: now,
        }))
    }

    /// Rolls back a slot, unless a newer one has replaced it since.
    pub fn release(&self, permit: Permit) {
        self.last_comment
            .remove_if(&(permit.user_id, permit.subject), |_, taken_at| {
                *taken_at == permit.taken_at
            });
    }

    /// Prunes at most once per window. Must run before any entry guard is
    /// taken, since `retain` locks every shard.
    fn sweep_if_due(&self, now: DateTime<Utc>) {
        let now_ms = now.timestamp_millis();
        let due = self.next_sweep_ms.load(Ordering::Acquire);
        if now_ms < due {
            return;
        }

        let next = now_ms.saturating_add(self.window.num_milliseconds());
        // one caller wins the sweep, the rest carry on
        if self
            .next_sweep_ms
            .compare_exchange(due, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.prune(now);
        }
    }

    /// Forgets slots whose window has passed.
    pub fn prune(&self, now: DateTime<Utc>) {
        let window = self.window;
        self.last_comment
            .retain(|_, taken_at| now - *taken_at < window);
    }

    pub fn len(&self) -> usize {
        self.last_comment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_comment.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{actor::Role, ids::ModId};

    fn member() -> Actor {
        Actor::new(UserId::new(), Role::Member)
    }

    #[test]
    fn test_second_comment_inside_window_is_rejected() {
        let limiter = RateLimiter::new(30);
        let actor = member();
        let subject = Subject::Mod(ModId::new());
        let start = Utc::now();

        limiter.check(&actor, subject, start).unwrap();

        let error = limiter
            .check(&actor, subject, start + Duration::seconds(10))
            .unwrap_err();
        assert!(error.is_forbidden());
        assert!(matches!(error, CommentError::RateLimited { remaining_secs: 20 }));
    }

    #[test]
    fn test_remaining_rounds_up() {
        let limiter = RateLimiter::new(30);
        let actor = member();
        let subject = Subject::Mod(ModId::new());
        let start = Utc::now();

        limiter.check(&actor, subject, start).unwrap();
        let error = limiter
            .check(&actor, subject, start + Duration::milliseconds(29_500))
            .unwrap_err();
        assert!(matches!(error, CommentError::RateLimited { remaining_secs: 1 }));
    }

    #[test]
    fn test_window_elapsed_allows_again() {
        let limiter = RateLimiter::new(30);
        let actor = member();
        let subject = Subject::Mod(ModId::new());
        let start = Utc::now();

        limiter.check(&actor, subject, start).unwrap();
        assert!(limiter
            .check(&actor, subject, start + Duration::seconds(30))
            .is_ok());
    }

    #[test]
    fn test_limit_is_per_subject() {
        let limiter = RateLimiter::new(30);
        let actor = member();
        let now = Utc::now();

        limiter.check(&actor, Subject::Mod(ModId::new()), now).unwrap();
        limiter.check(&actor, Subject::Mod(ModId::new()), now).unwrap();
        limiter.check(&actor, Subject::Profile(actor.id), now).unwrap();
    }

    #[test]
    fn test_moderator_tier_bypasses() {
        let limiter = RateLimiter::new(30);
        let admin = Actor::new(UserId::new(), Role::Administrator);
        let subject = Subject::Mod(ModId::new());
        let now = Utc::now();

        for _ in 0..5 {
            assert_eq!(limiter.check(&admin, subject, now).unwrap(), None);
        }
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_release_gives_slot_back() {
        let limiter = RateLimiter::new(30);
        let actor = member();
        let subject = Subject::Mod(ModId::new());
        let now = Utc::now();

        let permit = limiter.check(&actor, subject, now).unwrap().unwrap();
        limiter.release(permit);

        assert!(limiter.check(&actor, subject, now).is_ok());
    }

    #[test]
    fn test_prune_drops_expired_slots() {
        let limiter = RateLimiter::new(30);
        let now = Utc::now();
        limiter
            .check(&member(), Subject::Mod(ModId::new()), now - Duration::seconds(31))
            .unwrap();
        limiter.check(&member(), Subject::Mod(ModId::new()), now).unwrap();

        limiter.prune(now);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_expired_slots_are_swept_during_checks() {
        let limiter = RateLimiter::new(30);
        let start = Utc::now();

        // a long tail of one-off commenters, a minute apart
        for minute in 0..200 {
            let now = start + Duration::minutes(minute);
            limiter
                .check(&member(), Subject::Mod(ModId::new()), now)
                .unwrap();
            assert!(limiter.len() <= 2, "slots piled up: {}", limiter.len());
        }
    }

    #[test]
    fn test_sweep_keeps_live_slots() {
        let limiter = RateLimiter::new(30);
        let actor = member();
        let subject = Subject::Mod(ModId::new());
        let start = Utc::now();

        limiter
            .check(&member(), Subject::Mod(ModId::new()), start)
            .unwrap();
        limiter.check(&actor, subject, start + Duration::seconds(5)).unwrap();
        // someone else's check sweeps the first slot away
        limiter
            .check(&member(), Subject::Mod(ModId::new()), start + Duration::seconds(31))
            .unwrap();
        assert_eq!(limiter.len(), 2);

        assert!(limiter
            .check(&actor, subject, start + Duration::seconds(32))
            .is_err());
    }

    #[test]
    fn test_concurrent_checks_let_exactly_one_through() {
        let limiter = std::sync::Arc::new(RateLimiter::new(30));
        let actor = member();
        let subject = Subject::Mod(ModId::new());
        let now = Utc::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || limiter.check(&actor, subject, now).is_ok())
            })
            .collect();

        let passed = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(passed, 1);
    }
}
