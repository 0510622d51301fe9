use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::state::DaysState;

pub type SharedDays = Arc<tokio::sync::Mutex<DaysState>>;

pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

struct Entry {
    state: SharedDays,
    last_used: Instant,
}

/// One [`DaysState`] per signed-in user. Entries idle for longer than the
/// ttl are dropped, so a returning user starts again on today's date.
#[derive(Clone)]
pub struct DaysSessions {
    inner: Arc<Mutex<HashMap<Uuid, Entry>>>,
    idle_ttl: Duration,
}

impl Default for DaysSessions {
    fn default() -> Self {
        Self::with_idle_ttl(DEFAULT_IDLE_TTL)
    }
}

impl DaysSessions {
    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            inner: Arc::default(),
            idle_ttl,
        }
    }

    pub fn for_user(&self, user_id: Uuid) -> SharedDays {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        // a state still borrowed by a request is never dropped
        let before = map.len();
        map.retain(|_, e| {
            now.duration_since(e.last_used) < self.idle_ttl || Arc::strong_count(&e.state) > 1
        });
        if map.len() < before {
            debug!(evicted = before - map.len(), "idle day sessions dropped");
        }

        let entry = map.entry(user_id).or_insert_with(|| {
            let today = OffsetDateTime::now_utc().date();
            Entry {
                state: Arc::new(tokio::sync::Mutex::new(DaysState::new(Some(user_id), today))),
                last_used: now,
            }
        });
        entry.last_used = now;
        entry.state.clone()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    #[tokio::test]
    async fn same_user_shares_one_state() {
        let sessions = DaysSessions::default();
        let user = Uuid::new_v4();
        let a = sessions.for_user(user);
        let b = sessions.for_user(user);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.lock().await.session, Some(user));
        assert!(!Arc::ptr_eq(&a, &sessions.for_user(Uuid::new_v4())));
        assert_eq!(sessions.len(), 2);
    }

    #[tokio::test]
    async fn idle_state_is_recreated_on_today() {
        let sessions = DaysSessions::with_idle_ttl(Duration::ZERO);
        let user = Uuid::new_v4();

        let first = sessions.for_user(user);
        first.lock().await.current_date = date!(2020 - 01 - 01);
        let weak = Arc::downgrade(&first);
        drop(first);

        let second = sessions.for_user(user);
        assert!(weak.upgrade().is_none());
        assert_eq!(second.lock().await.current_date, OffsetDateTime::now_utc().date());
    }

    #[tokio::test]
    async fn state_in_use_is_not_evicted() {
        let sessions = DaysSessions::with_idle_ttl(Duration::ZERO);
        let user = Uuid::new_v4();
        let held = sessions.for_user(user);

        let other = sessions.for_user(Uuid::new_v4());
        drop(other);
        assert!(Arc::ptr_eq(&held, &sessions.for_user(user)));
        // the other user's idle entry went on that last call
        assert_eq!(sessions.len(), 1);
    }
}
