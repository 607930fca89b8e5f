//! Virtual-time timer queue.
//!
//! Nothing fires on its own: the owner calls [`TimerQueue::fire_due`] with the
//! current instant and gets back every uncancelled entry whose deadline has
//! passed, earliest first. Each entry is identified by a [`TimerToken`] that
//! is never reused, so a slot holding a stale token can always tell that a
//! firing is not its own.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

impl fmt::Display for TimerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// The deferred actions a session schedules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    RemoveTask { id: String },
    DismissToast,
    DismissBanner,
}

#[derive(Debug, Clone)]
struct Entry<E> {
    token: TimerToken,
    deadline: DateTime<Utc>,
    event: E,
}

#[derive(Debug, Clone)]
pub struct TimerQueue<E> {
    next_token: u64,
    entries: Vec<Entry<E>>,
}

impl<E> Default for TimerQueue<E> {
    fn default() -> Self {
        Self {
            next_token: 1,
            entries: Vec::new(),
        }
    }
}

impl<E: fmt::Debug> TimerQueue<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, now: DateTime<Utc>, delay: Duration, event: E) -> TimerToken {
        let token = TimerToken(self.next_token);
        self.next_token += 1;
        let deadline = now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC);
        trace!(%token, %deadline, ?event, "scheduled timer");
        self.entries.push(Entry {
            token,
            deadline,
            event,
        });
        token
    }

    /// Returns whether the token was still pending.
    pub fn cancel(&mut self, token: TimerToken) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.token != token);
        let removed = self.entries.len() != before;
        trace!(%token, removed, "cancelled timer");
        removed
    }

    pub fn is_pending(&self, token: TimerToken) -> bool {
        self.entries.iter().any(|entry| entry.token == token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.entries.iter().map(|entry| entry.deadline).min()
    }

    /// Removes and returns every entry due at `now`, ordered by deadline and
    /// then by scheduling order.
    pub fn fire_due(&mut self, now: DateTime<Utc>) -> Vec<(TimerToken, E)> {
        let (mut due, pending): (Vec<_>, Vec<_>) = self
            .entries
            .drain(..)
            .partition(|entry| entry.deadline <= now);
        self.entries = pending;

        due.sort_by_key(|entry| (entry.deadline, entry.token));
        due.into_iter()
            .map(|entry| {
                trace!(token = %entry.token, "timer fired");
                (entry.token, entry.event)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::TimerQueue;

    #[test]
    fn oversized_delay_saturates_instead_of_overflowing() {
        let now = Utc
            .with_ymd_and_hms(2026, 2, 17, 12, 0, 0)
            .single()
            .expect("valid now");
        let mut queue = TimerQueue::new();
        let token = queue.schedule(now, Duration::milliseconds(i64::MAX), "never");

        assert_eq!(queue.next_deadline(), Some(DateTime::<Utc>::MAX_UTC));
        assert!(queue.fire_due(now + Duration::days(365)).is_empty());
        assert!(queue.is_pending(token));
    }

    #[test]
    fn fires_in_deadline_order_and_skips_cancelled() {
        let start = Utc
            .with_ymd_and_hms(2026, 2, 17, 12, 0, 0)
            .single()
            .expect("valid now");
        let mut queue = TimerQueue::new();
        let late = queue.schedule(start, Duration::milliseconds(500), "late");
        let early = queue.schedule(start, Duration::milliseconds(100), "early");
        let dropped = queue.schedule(start, Duration::milliseconds(200), "dropped");

        assert!(queue.cancel(dropped));
        assert!(!queue.cancel(dropped));
        assert_eq!(queue.next_deadline(), Some(start + Duration::milliseconds(100)));

        assert!(queue.fire_due(start + Duration::milliseconds(99)).is_empty());

        let fired = queue.fire_due(start + Duration::seconds(1));
        assert_eq!(fired, vec![(early, "early"), (late, "late")]);
        assert!(queue.is_empty());
        assert!(!queue.is_pending(late));
    }

    #[test]
    fn tokens_are_never_reused() {
        let now = Utc::now();
        let mut queue = TimerQueue::new();
        let a = queue.schedule(now, Duration::zero(), ());
        queue.fire_due(now);
        let b = queue.schedule(now, Duration::zero(), ());
        assert_ne!(a, b);
    }
}
