use std::collections::VecDeque;

/// Bounded-rate primitive shared by the rate limiter and the spam detector:
/// an ordered deque of event timestamps trimmed to a trailing interval.
///
/// Invariants: no stored timestamp is older than `now - window`, and after a
/// successful `try_acquire` the deque never holds more than the limit passed
/// to that call.
#[derive(Debug, Clone, Default)]
pub struct SlidingWindow {
    timestamps: VecDeque<i64>,
}

impl SlidingWindow {
    pub fn new() -> Self {
        Self::default()
    }

    fn prune(&mut self, window_ms: i64, now_ms: i64) {
        let cutoff = now_ms - window_ms;
        // A timestamp exactly at the cutoff is still inside the window.
        while self.timestamps.front().is_some_and(|&ts| ts < cutoff) {
            self.timestamps.pop_front();
        }
    }

    /// Admit one event iff the window would stay within `limit` afterwards.
    /// On denial nothing is mutated beyond dropping aged-out timestamps.
    pub fn try_acquire(&mut self, limit: usize, window_ms: i64, now_ms: i64) -> bool {
        self.prune(window_ms, now_ms);
        if self.timestamps.len() < limit {
            self.timestamps.push_back(now_ms);
            true
        } else {
            false
        }
    }

    /// Record unconditionally. Used where the window observes traffic
    /// (spam cadence, error volume, bot emissions) rather than gating it.
    pub fn record(&mut self, window_ms: i64, now_ms: i64) {
        self.prune(window_ms, now_ms);
        self.timestamps.push_back(now_ms);
    }

    /// Events remaining in the trailing window.
    pub fn count(&mut self, window_ms: i64, now_ms: i64) -> usize {
        self.prune(window_ms, now_ms);
        self.timestamps.len()
    }

    /// Most recent event, if any survived pruning.
    pub fn last(&self) -> Option<i64> {
        self.timestamps.back().copied()
    }

    pub fn is_idle(&self, window_ms: i64, now_ms: i64) -> bool {
        self.timestamps
            .back()
            .is_none_or(|&ts| ts < now_ms - window_ms)
    }
}
