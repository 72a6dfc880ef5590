//! Per-user burst tracking for Flow A's fast-approve gate.
//!
//! Shaped directly on this codebase's IP-keyed sliding-window rate limiter:
//! a mutex-guarded map from key to a small window counter, reset when the
//! window elapses. Flow A only needs a yes/no "is this user currently
//! bursting" signal, not a hard reject, so there is no burst/exceeded split
//! here — just a boolean derived from the count.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct BurstEntry {
    count: u32,
    window_start: Instant,
}

pub struct BurstTracker {
    window: Duration,
    threshold: u32,
    state: Mutex<HashMap<String, BurstEntry>>,
}

impl BurstTracker {
    pub fn new(window: Duration, threshold: u32) -> Self {
        Self { window, threshold, state: Mutex::new(HashMap::new()) }
    }

    /// Records an arrival for `key` and returns whether the user is
    /// currently bursting (more than `threshold` arrivals within `window`).
    pub fn record_and_check(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();
        let entry = state.entry(key.to_string()).or_insert(BurstEntry { count: 0, window_start: now });

        if now.duration_since(entry.window_start) >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }
        entry.count += 1;
        entry.count > self.threshold
    }

    /// Periodic cleanup of stale entries; call from a background sweep.
    pub fn cleanup(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        let window = self.window;
        state.retain(|_, entry| now.duration_since(entry.window_start) < window * 2);
    }
}

impl Default for BurstTracker {
    fn default() -> Self {
        // Five posts inside ten seconds reads as bursting for Flow A purposes.
        Self::new(Duration::from_secs(10), 5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_detected_after_threshold_within_window() {
        let tracker = BurstTracker::new(Duration::from_secs(10), 3);
        for _ in 0..3 {
            assert!(!tracker.record_and_check("alice"));
        }
        assert!(tracker.record_and_check("alice"));
    }

    #[test]
    fn different_users_track_independently() {
        let tracker = BurstTracker::new(Duration::from_secs(10), 1);
        assert!(!tracker.record_and_check("alice"));
        assert!(!tracker.record_and_check("bob"));
    }
}
