//! [`SignFilter`] – windowed velocity-sign estimate for dead-zone
//! compensation.
//!
//! Dead-zone compensation adds a driver offset in the direction of motion.
//! Taking the raw sign of a near-zero velocity would make the offset chatter
//! between +1 and -1 every cycle, so the sign is smoothed over a fixed-size
//! sliding window: the filter reports a nonzero sign only when every sample
//! in a full window agrees. Bounded memory, O(1) per tick.

use std::collections::VecDeque;

/// Sliding-window sign smoother for one joint.
#[derive(Debug, Clone)]
pub struct SignFilter {
    window: VecDeque<i8>,
    size: usize,
}

impl SignFilter {
    /// Create a filter with the given window size. A size of 1 degenerates
    /// to the raw sign; size 0 always reports zero.
    pub fn new(size: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(size),
            size,
        }
    }

    /// Push one velocity sample and return the smoothed sign estimate:
    /// `1.0`, `-1.0`, or `0.0` when the window is not yet full or the
    /// samples disagree.
    pub fn push(&mut self, velocity: f64) -> f64 {
        if self.size == 0 {
            return 0.0;
        }
        let sign: i8 = if velocity > 0.0 {
            1
        } else if velocity < 0.0 {
            -1
        } else {
            0
        };
        self.window.push_back(sign);
        while self.window.len() > self.size {
            self.window.pop_front();
        }
        self.smoothed()
    }

    /// Current estimate without pushing a new sample.
    pub fn smoothed(&self) -> f64 {
        if self.window.len() < self.size {
            return 0.0;
        }
        let first = self.window[0];
        if first != 0 && self.window.iter().all(|&s| s == first) {
            f64::from(first)
        } else {
            0.0
        }
    }

    /// Clear the window (used when a joint's mode changes).
    pub fn reset(&mut self) {
        self.window.clear();
    }
}
