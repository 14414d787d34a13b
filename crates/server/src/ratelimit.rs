//! Per-peer connection throttle
//!
//! Uses governor's keyed limiter: one quota per remote IP, state created on
//! first sight and trimmed by `retain_recent`. This guards the QUIC endpoint
//! itself; the attempt-level limits live in the decision engine.

use antibrute_core::CoreError;
use governor::{clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

type KeyedLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Connection throttle keyed by peer IP
#[derive(Clone)]
pub struct ConnectionLimiter {
    limiter: Arc<KeyedLimiter>,
}

impl ConnectionLimiter {
    /// Allow `per_minute` connections per peer; a zero rate falls back to one
    pub fn new(per_minute: u32) -> Self {
        let rate = NonZeroU32::new(per_minute).unwrap_or(nonzero!(1u32));
        Self {
            limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(rate))),
        }
    }

    /// Check (and consume) one connection slot for `ip`
    pub fn check(&self, ip: IpAddr) -> Result<(), CoreError> {
        self.limiter
            .check_key(&ip)
            .map_err(|_| CoreError::RateLimitExceeded)
    }

    /// Drop state for peers whose quota has fully recovered
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    /// Number of peers currently tracked
    pub fn tracked(&self) -> usize {
        self.limiter.len()
    }
}
