//! Token-bucket rate limiting for the outbound web and alert streams.

use crate::constants::governor as limits;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_update: Instant,
}

/// Monotonic-clock token bucket. `acquire` suspends cooperatively until a
/// token is available.
pub struct RateLimiter {
    rate: f64,
    capacity: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(rate: f64, capacity: u32) -> Self {
        Self {
            rate,
            capacity: f64::from(capacity),
            bucket: Mutex::new(Bucket {
                tokens: f64::from(capacity),
                last_update: Instant::now(),
            }),
        }
    }

    pub async fn acquire(&self) {
        // The lock is held across the refill sleep so waiters drain in
        // lock-acquisition order.
        let mut bucket = self.bucket.lock().await;
        loop {
            let now = Instant::now();
            let elapsed = now.duration_since(bucket.last_update).as_secs_f64();
            bucket.last_update = now;
            bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.capacity);

            if bucket.tokens >= 1.0 {
                bucket.tokens -= 1.0;
                return;
            }
            let wait = (1.0 - bucket.tokens) / self.rate;
            tokio::time::sleep(Duration::from_secs_f64(wait)).await;
        }
    }
}

/// Process-wide rate budgets, created once at startup and shared by
/// reference.
pub struct Governor {
    pub web: RateLimiter,
    pub alerts: RateLimiter,
}

impl Governor {
    pub fn new() -> Self {
        Self {
            web: RateLimiter::new(limits::WEB_RATE, limits::WEB_BURST),
            alerts: RateLimiter::new(limits::ALERT_RATE, limits::ALERT_BURST),
        }
    }
}

impl Default for Governor {
    fn default() -> Self {
        Self::new()
    }
}
