//! Token buckets backing per-agent request limits

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Requests per second for agents without their own limit
pub const DEFAULT_RATE_LIMIT_RPS: f64 = 5.0;

/// Burst size for agents without their own limit
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 10;

/// Sustained rate plus burst allowance for one agent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Tokens added per second; zero or less disables the limit
    pub rps: f64,
    /// Bucket capacity
    pub burst: u32,
}

impl RateLimit {
    /// Create a limit
    pub const fn new(rps: f64, burst: u32) -> Self {
        Self { rps, burst }
    }

    /// Whether requests are limited at all
    pub fn is_enabled(&self) -> bool {
        self.rps > 0.0
    }

    fn capacity(&self) -> f64 {
        f64::from(self.burst.max(1))
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT_RPS, DEFAULT_RATE_LIMIT_BURST)
    }
}

/// Bucket state for one agent; starts full.
#[derive(Debug, Clone)]
pub(crate) struct TokenBucket {
    limit: RateLimit,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub(crate) fn new(limit: RateLimit, now: Instant) -> Self {
        Self {
            limit,
            tokens: limit.capacity(),
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.limit.rps).min(self.limit.capacity());
        self.last_refill = now;
    }

    /// Take one token, or report how long until one is available
    pub(crate) fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }
        let deficit = 1.0 - self.tokens;
        Err(Duration::from_secs_f64(deficit / self.limit.rps))
    }

    /// Whether the bucket has refilled completely, i.e. the agent has been idle
    pub(crate) fn is_full(&mut self, now: Instant) -> bool {
        self.refill(now);
        self.tokens >= self.limit.capacity()
    }

    pub(crate) fn limit(&self) -> RateLimit {
        self.limit
    }
}
