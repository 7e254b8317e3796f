//! Per-source token-bucket rate limiting.
//!
//! Each upstream API gets its own bucket, so a slow or strict source
//! (PubMed without a key: 2 req/s) never throttles the others.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A token bucket with a fixed refill rate.
///
/// `acquire` blocks the calling worker thread until a token is
/// available. Burst capacity equals one second of refill (minimum 1).
pub struct TokenBucket {
    refill_per_sec: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(requests_per_second: f64) -> Self {
        let capacity = requests_per_second.max(1.0);
        Self {
            refill_per_sec: requests_per_second,
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Block until one token is available, then take it.
    pub fn acquire(&self) {
        if self.refill_per_sec <= 0.0 {
            return;
        }
        loop {
            let wait = {
                let mut state = self.state.lock().expect("rate limiter poisoned");
                let elapsed = state.last_refill.elapsed();
                state.tokens =
                    (state.tokens + elapsed.as_secs_f64() * self.refill_per_sec).min(self.capacity);
                state.last_refill = Instant::now();
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                // Time until one full token accrues
                Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_sec)
            };
            std::thread::sleep(wait);
        }
    }

    /// Take a token if one is available right now (non-blocking).
    pub fn try_acquire(&self) -> bool {
        if self.refill_per_sec <= 0.0 {
            return true;
        }
        let mut state = self.state.lock().expect("rate limiter poisoned");
        let elapsed = state.last_refill.elapsed();
        state.tokens =
            (state.tokens + elapsed.as_secs_f64() * self.refill_per_sec).min(self.capacity);
        state.last_refill = Instant::now();
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
