//! Per-signal circuit breaker: hard rate limit for runaway update loops.
//!
//! This is a fail-safe, not a self-healing rate limiter: once a signal trips
//! the breaker it stays paused until the host explicitly resumes it.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::warn;

#[derive(Clone, Copy, Debug)]
struct WindowCounter {
    count: u32,
    window_start: Instant,
}

/// Per-label update-rate limiter.
#[derive(Debug)]
pub struct CircuitBreaker {
    counters: HashMap<String, WindowCounter>,
    paused: HashSet<String>,
    threshold: u32,
    window: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, window: Duration) -> Self {
        Self {
            counters: HashMap::new(),
            paused: HashSet::new(),
            threshold,
            window,
        }
    }

    /// Count one update for `label` and decide whether it may proceed.
    ///
    /// Returns `false` if the label is already paused, or if this update
    /// pushes it over the threshold (which trips the breaker). The counter
    /// resets whenever the rolling window elapses.
    pub fn admit(&mut self, label: &str) -> bool {
        if self.paused.contains(label) {
            return false;
        }

        let now = Instant::now();
        let counter = self
            .counters
            .entry(label.to_string())
            .or_insert(WindowCounter {
                count: 0,
                window_start: now,
            });

        if now.duration_since(counter.window_start) >= self.window {
            counter.count = 0;
            counter.window_start = now;
        }

        counter.count += 1;
        if counter.count > self.threshold {
            warn!(
                signal = label,
                updates = counter.count,
                limit = self.threshold,
                "circuit breaker tripped; signal paused"
            );
            self.paused.insert(label.to_string());
            return false;
        }

        true
    }

    /// Whether the breaker has paused this label.
    #[inline]
    pub fn is_paused(&self, label: &str) -> bool {
        self.paused.contains(label)
    }

    /// Explicitly un-pause a label. There is no implicit recovery.
    pub fn resume(&mut self, label: &str) {
        self.paused.remove(label);
        self.counters.remove(label);
    }

    /// Drop all bookkeeping for an unregistered label.
    pub fn forget(&mut self, label: &str) {
        self.paused.remove(label);
        self.counters.remove(label);
    }
}
