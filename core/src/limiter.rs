//! Global request-rate throttle
//!
//! One token bucket shared by every request worker. Tokens are released at
//! `1 / rate` intervals with a burst of one, so issue attempts cannot bunch
//! up beyond a single slot. The wait is an ordinary future and cancels with
//! the same shutdown signal that cancels HTTP I/O.

use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

/// Token-based issue-rate ceiling, bypassed entirely when unlimited
pub struct Throttle {
    limiter: Option<DefaultDirectRateLimiter>,
    per_second: Option<NonZeroU32>,
}

impl Throttle {
    /// Throttle at `per_second` attempts per second; `None` disables it
    pub fn new(per_second: Option<NonZeroU32>) -> Self {
        let limiter = per_second.map(|rate| {
            let quota = Quota::per_second(rate).allow_burst(NonZeroU32::MIN);
            RateLimiter::direct(quota)
        });

        Self { limiter, per_second }
    }

    /// Throttle that never waits
    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// Wait until the next attempt is allowed
    ///
    /// Returns immediately when no rate limit is configured.
    pub async fn acquire(&self) {
        if let Some(ref limiter) = self.limiter {
            limiter.until_ready().await;
        }
    }

    /// Whether a rate limit is configured
    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    /// The configured ceiling, if any
    pub fn per_second(&self) -> Option<NonZeroU32> {
        self.per_second
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("per_second", &self.per_second)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
