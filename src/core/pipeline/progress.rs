//! Progress event throttling.
//!
//! Chunk acknowledgments can arrive far faster than a UI wants repaints.
//! The gate coalesces them: an event passes when the configured interval
//! has elapsed since the last emission, or when progress jumped by at
//! least the configured percentage delta. The terminal 100% mark always
//! passes so the progress bar lands exactly full.

use crate::core::session::percent_of;
use std::time::{Duration, Instant};

/// Time- and delta-gated emission policy for one session's progress events.
#[derive(Debug)]
pub struct ProgressGate {
    min_interval: Duration,
    min_delta_percent: u8,
    last_emit: Option<Instant>,
    last_percent: u8,
}

impl ProgressGate {
    pub fn new(min_interval: Duration, min_delta_percent: u8) -> Self {
        Self {
            min_interval,
            min_delta_percent,
            last_emit: None,
            last_percent: 0,
        }
    }

    /// Decide whether a progress update at `bytes` of `total` should be
    /// emitted now. Recording happens only when the answer is yes, so
    /// suppressed updates accumulate toward the delta threshold.
    pub fn should_emit(&mut self, bytes: u64, total: u64) -> bool {
        let percent = percent_of(bytes, total);

        let pass = match self.last_emit {
            None => true,
            Some(at) => {
                (percent >= 100 && self.last_percent < 100)
                    || at.elapsed() >= self.min_interval
                    || percent.saturating_sub(self.last_percent) >= self.min_delta_percent
            }
        };

        if pass {
            self.last_emit = Some(Instant::now());
            self.last_percent = percent;
        }
        pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_update_always_emits() {
        let mut gate = ProgressGate::new(Duration::from_secs(60), 10);
        assert!(gate.should_emit(1, 100));
    }

    #[test]
    fn small_updates_inside_interval_are_coalesced() {
        let mut gate = ProgressGate::new(Duration::from_secs(60), 10);
        assert!(gate.should_emit(5, 100));
        assert!(!gate.should_emit(6, 100));
        assert!(!gate.should_emit(9, 100));
        // Accumulated delta crosses the threshold.
        assert!(gate.should_emit(15, 100));
    }

    #[test]
    fn elapsed_interval_lets_update_through() {
        let mut gate = ProgressGate::new(Duration::from_millis(0), 100);
        assert!(gate.should_emit(1, 100));
        assert!(gate.should_emit(2, 100));
    }

    #[test]
    fn completion_always_emits() {
        let mut gate = ProgressGate::new(Duration::from_secs(60), 50);
        assert!(gate.should_emit(10, 100));
        assert!(!gate.should_emit(20, 100));
        assert!(gate.should_emit(100, 100));
    }
}
