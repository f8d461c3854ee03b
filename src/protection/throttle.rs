//! Denied-pickup notification throttle
//!
//! A player walking over someone else's item triggers a pickup attempt on
//! every tick. Only the first attempt per cooldown window produces a message.
//! Expired entries are pruned on the registry janitor's schedule.

use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::host::entity::PlayerId;
use crate::host::world::WorldView;
use crate::visibility::janitor::SweepTarget;

/// Minimum time between two notifications to the same player
pub const NOTIFICATION_COOLDOWN: Duration = Duration::from_millis(2000);

/// Per-player cooldown gate
pub struct NotificationThrottle {
    cooldown: Duration,
    last_notified: DashMap<PlayerId, Instant>,
}

impl Default for NotificationThrottle {
    fn default() -> Self {
        Self::new(NOTIFICATION_COOLDOWN)
    }
}

impl NotificationThrottle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_notified: DashMap::new(),
        }
    }

    /// Whether the player should be notified now
    pub fn should_notify(&self, player: PlayerId) -> bool {
        self.should_notify_at(player, Instant::now())
    }

    /// Check-and-set under the entry lock, so two concurrent callers cannot
    /// both win the same window
    pub fn should_notify_at(&self, player: PlayerId, now: Instant) -> bool {
        match self.last_notified.entry(player) {
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
            Entry::Occupied(mut entry) => {
                if now.saturating_duration_since(*entry.get()) >= self.cooldown {
                    entry.insert(now);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Drop entries whose window has passed
    pub fn prune_expired(&self) -> usize {
        self.prune_expired_at(Instant::now())
    }

    /// Drop entries whose window has passed at `now`. A pruned player is
    /// notified on the next attempt exactly as before.
    pub fn prune_expired_at(&self, now: Instant) -> usize {
        let before = self.last_notified.len();
        self.last_notified
            .retain(|_, last| now.saturating_duration_since(*last) < self.cooldown);
        before.saturating_sub(self.last_notified.len())
    }

    pub fn clear(&self) {
        self.last_notified.clear();
    }

    pub fn len(&self) -> usize {
        self.last_notified.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_notified.is_empty()
    }
}

impl SweepTarget for NotificationThrottle {
    fn label(&self) -> &str {
        "notification-throttle"
    }

    fn sweep(&self, _world: &dyn WorldView) -> usize {
        self.prune_expired()
    }

    fn tracked(&self) -> usize {
        self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_cooldown_window() {
        let throttle = NotificationThrottle::default();
        let alice = PlayerId::from_name("alice");
        let t0 = Instant::now();

        assert!(throttle.should_notify_at(alice, t0));
        assert!(!throttle.should_notify_at(alice, t0 + Duration::from_millis(500)));
        assert!(!throttle.should_notify_at(alice, t0 + Duration::from_millis(1999)));
        assert!(throttle.should_notify_at(alice, t0 + Duration::from_millis(2000)));
        assert!(!throttle.should_notify_at(alice, t0 + Duration::from_millis(3000)));
    }

    #[test]
    fn test_players_are_independent() {
        let throttle = NotificationThrottle::default();
        let t0 = Instant::now();
        assert!(throttle.should_notify_at(PlayerId::from_name("a"), t0));
        assert!(throttle.should_notify_at(PlayerId::from_name("b"), t0));
    }

    #[test]
    fn test_prune_and_clear() {
        let throttle = NotificationThrottle::default();
        let t0 = Instant::now();
        throttle.should_notify_at(PlayerId::from_name("a"), t0);
        throttle.should_notify_at(PlayerId::from_name("b"), t0 + Duration::from_secs(5));

        // "a" expired at t0 + 2s, "b" is still inside its window
        assert_eq!(throttle.prune_expired_at(t0 + Duration::from_secs(6)), 1);
        assert_eq!(throttle.len(), 1);
        assert!(!throttle.should_notify_at(PlayerId::from_name("b"), t0 + Duration::from_secs(6)));
        assert!(throttle.should_notify_at(PlayerId::from_name("a"), t0 + Duration::from_secs(6)));

        throttle.clear();
        assert!(throttle.is_empty());
        assert!(throttle.should_notify_at(PlayerId::from_name("b"), t0 + Duration::from_secs(5)));
    }

    #[test]
    fn test_sweep_drops_expired_entries() {
        let throttle = NotificationThrottle::new(Duration::ZERO);
        for name in ["a", "b", "c"] {
            throttle.should_notify(PlayerId::from_name(name));
        }
        assert_eq!(throttle.tracked(), 3);

        let world = crate::host::world::WorldSet::new();
        assert_eq!(throttle.sweep(&world), 3);
        assert!(throttle.is_empty());
    }

    #[test]
    fn test_concurrent_callers_single_winner() {
        let throttle = Arc::new(NotificationThrottle::default());
        let wins = Arc::new(AtomicUsize::new(0));
        let player = PlayerId::from_name("racer");
        let now = Instant::now();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let throttle = throttle.clone();
                let wins = wins.clone();
                thread::spawn(move || {
                    if throttle.should_notify_at(player, now) {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(wins.load(Ordering::SeqCst), 1);
    }
}
