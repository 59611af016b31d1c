//! Keyed throttle windows.
//!
//! The throttle never reads a clock itself; callers pass `now`, which keeps it
//! deterministic under tokio's paused test clock.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

/// Result of checking a key against its window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// No accepted call inside the window; the call was recorded
    Allowed,
    /// Suppressed; the window re-opens after `remaining`
    Suppressed { remaining: Duration },
}

impl ThrottleDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ThrottleDecision::Allowed)
    }
}

/// Last-accepted timestamps per key
#[derive(Debug)]
pub struct Throttle<K> {
    last_accepted: HashMap<K, Instant>,
}

impl<K> Default for Throttle<K> {
    fn default() -> Self {
        Self {
            last_accepted: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> Throttle<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `key` at `now`. An allowed call starts a new window.
    ///
    /// A call landing exactly `window` after the last accepted one is allowed.
    pub fn check(&mut self, key: &K, now: Instant, window: Duration) -> ThrottleDecision {
        if let Some(last) = self.last_accepted.get(key) {
            let elapsed = now.saturating_duration_since(*last);
            if elapsed < window {
                return ThrottleDecision::Suppressed {
                    remaining: window - elapsed,
                };
            }
        }

        self.last_accepted.insert(key.clone(), now);
        ThrottleDecision::Allowed
    }

    /// Start a window for `key` without checking
    pub fn record(&mut self, key: &K, now: Instant) {
        self.last_accepted.insert(key.clone(), now);
    }

    /// Forget `key`; the next call is allowed
    pub fn reset(&mut self, key: &K) -> bool {
        self.last_accepted.remove(key).is_some()
    }

    /// Keep only the keys matching `keep`
    pub fn retain(&mut self, mut keep: impl FnMut(&K) -> bool) {
        self.last_accepted.retain(|key, _| keep(key));
    }

    pub fn len(&self) -> usize {
        self.last_accepted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_accepted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(2_000);

    #[test]
    fn test_one_call_per_window() {
        let mut throttle = Throttle::new();
        let start = Instant::now();
        let key = ("c1".to_string(), "bob".to_string());

        assert!(throttle.check(&key, start, WINDOW).is_allowed());
        assert_eq!(
            throttle.check(&key, start + Duration::from_millis(500), WINDOW),
            ThrottleDecision::Suppressed {
                remaining: Duration::from_millis(1_500)
            }
        );
        // suppressed calls do not extend the window
        assert!(throttle
            .check(&key, start + Duration::from_millis(2_000), WINDOW)
            .is_allowed());
    }

    #[test]
    fn test_keys_are_independent() {
        let mut throttle = Throttle::new();
        let now = Instant::now();

        assert!(throttle.check(&"a", now, WINDOW).is_allowed());
        assert!(throttle.check(&"b", now, WINDOW).is_allowed());
        assert!(!throttle.check(&"a", now, WINDOW).is_allowed());
        assert_eq!(throttle.len(), 2);
    }

    #[test]
    fn test_reset_and_retain() {
        let mut throttle = Throttle::new();
        let now = Instant::now();

        throttle.record(&("c1", "a"), now);
        throttle.record(&("c1", "b"), now);
        throttle.record(&("c2", "a"), now);
        assert!(throttle.reset(&("c1", "a")));
        assert!(!throttle.reset(&("c1", "a")));
        assert!(throttle.check(&("c1", "a"), now, WINDOW).is_allowed());

        throttle.retain(|key| key.0 != "c1");
        assert_eq!(throttle.len(), 1);
        assert!(throttle.check(&("c1", "b"), now, WINDOW).is_allowed());
        assert!(!throttle.check(&("c2", "a"), now, WINDOW).is_allowed());
    }

    #[test]
    fn test_zero_window_never_suppresses() {
        let mut throttle = Throttle::new();
        let now = Instant::now();
        assert!(throttle.check(&"a", now, Duration::ZERO).is_allowed());
        assert!(throttle.check(&"a", now, Duration::ZERO).is_allowed());
    }
}
