//! Token-bucket admission control.
//!
//! The bucket refills on a fixed 100 ms interval and caps accumulated tokens
//! at one second's worth, so an idle bucket permits a burst of at most `rps`.

use std::sync::Mutex;
use std::sync::Arc;

use crate::clock::TimeSource;

const REFILL_INTERVAL_MILLIS: i64 = 100;
const INTERVALS_PER_SECOND: usize = 10;

struct BucketState {
    tokens: usize,
    next_refill_at: i64,
}

/// Thread-safe token bucket driven by a [`TimeSource`].
pub struct TokenBucket {
    rps: usize,
    time_source: Arc<dyn TimeSource>,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(rps: usize, time_source: Arc<dyn TimeSource>) -> Self {
        Self {
            rps,
            time_source,
            state: Mutex::new(BucketState {
                tokens: 0,
                next_refill_at: 0,
            }),
        }
    }

    /// Takes `count` tokens if available. Non-blocking.
    pub fn try_consume(&self, count: usize) -> bool {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            // A poisoned bucket fails closed.
            Err(_) => return false,
        };
        self.refill(&mut state);
        if state.tokens >= count {
            state.tokens -= count;
            true
        } else {
            false
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = self.time_source.now_millis();
        if now < state.next_refill_at {
            return;
        }
        let per_interval = (self.rps / INTERVALS_PER_SECOND).max(1);
        let intervals = if state.next_refill_at == 0 {
            1
        } else {
            ((now - state.next_refill_at) / REFILL_INTERVAL_MILLIS + 1) as usize
        };
        state.tokens = self
            .rps
            .max(1)
            .min(state.tokens + per_interval.saturating_mul(intervals));
        state.next_refill_at = now + REFILL_INTERVAL_MILLIS;
    }
}
