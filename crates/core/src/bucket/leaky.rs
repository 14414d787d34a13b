//! Leaky bucket (GCRA, virtual scheduling)
//!
//! Each conforming request adds `increment` of content; content drains at
//! one unit per unit of time. A request is rejected while the drained
//! content exceeds `tolerance`. With `increment = minute / limit` and
//! `tolerance = minute - increment` a fresh bucket admits a burst of
//! `limit` requests, matching [`TokenBucket`](super::TokenBucket).

use super::{Bucket, MINUTE};
use crate::{CoreError, Result};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct LeakyState {
    /// Content left after the last conforming request (X)
    content: Duration,
    /// Last conformance time (LCT), unset until the first request
    last_conform: Option<Instant>,
    last_active: Instant,
}

impl LeakyState {
    /// Content drained down to `now` (X')
    fn drained(&self, now: Instant) -> Duration {
        match self.last_conform {
            Some(lct) => self
                .content
                .saturating_sub(now.saturating_duration_since(lct)),
            None => Duration::ZERO,
        }
    }
}

/// Leaky bucket rate limiter
#[derive(Debug)]
pub struct LeakyBucket {
    increment: Duration,
    tolerance: Duration,
    active_timeout: Duration,
    state: Mutex<LeakyState>,
}

impl LeakyBucket {
    /// Create an empty bucket
    ///
    /// # Errors
    /// - `InvalidConfig` if `increment` is zero
    pub fn new(
        now: Instant,
        increment: Duration,
        tolerance: Duration,
        active_timeout: Duration,
    ) -> Result<Self> {
        if increment.is_zero() {
            return Err(CoreError::InvalidConfig(
                "leaky bucket increment must be greater than zero".into(),
            ));
        }

        Ok(Self {
            increment,
            tolerance,
            active_timeout,
            state: Mutex::new(LeakyState {
                content: Duration::ZERO,
                last_conform: None,
                last_active: now,
            }),
        })
    }

    /// Create a bucket admitting `limit` requests per minute
    pub fn per_minute(now: Instant, limit: u32, active_timeout: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(CoreError::InvalidConfig(
                "bucket limit must be greater than zero".into(),
            ));
        }
        let increment = (MINUTE / limit).max(Duration::from_nanos(1));
        let tolerance = MINUTE.saturating_sub(increment);
        Self::new(now, increment, tolerance, active_timeout)
    }
}

impl Bucket for LeakyBucket {
    fn conform(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        state.last_active = now;

        let drained = state.drained(now);
        if drained > self.tolerance {
            return false;
        }

        state.content = drained + self.increment;
        state.last_conform = Some(now);
        true
    }

    fn is_active(&self, now: Instant) -> bool {
        let state = self.state.lock();
        !state.drained(now).is_zero()
            || now.saturating_duration_since(state.last_active) <= self.active_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(120);

    #[test]
    fn test_zero_limit_rejected() {
        let result = LeakyBucket::per_minute(Instant::now(), 0, TIMEOUT);
        assert!(matches!(result, Err(CoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_burst_of_limit() {
        let t0 = Instant::now();
        for limit in [1u32, 3, 10, 1000] {
            let bucket = LeakyBucket::per_minute(t0, limit, TIMEOUT).unwrap();
            for _ in 0..limit {
                assert!(bucket.conform(t0));
            }
            assert!(!bucket.conform(t0), "limit {} exceeded", limit);
        }
    }

    #[test]
    fn test_drains_one_increment_per_interval() {
        let t0 = Instant::now();
        let bucket = LeakyBucket::per_minute(t0, 10, TIMEOUT).unwrap();
        for _ in 0..10 {
            assert!(bucket.conform(t0));
        }
        assert!(!bucket.conform(t0 + Duration::from_secs(5)));
        assert!(bucket.conform(t0 + Duration::from_secs(6)));
        assert!(!bucket.conform(t0 + Duration::from_secs(6)));
    }

    #[test]
    fn test_login_limit_one_regenerates_after_minute() {
        let t0 = Instant::now();
        let bucket = LeakyBucket::per_minute(t0, 1, TIMEOUT).unwrap();
        assert!(bucket.conform(t0));
        assert!(!bucket.conform(t0 + Duration::from_secs(59)));
        assert!(bucket.conform(t0 + MINUTE));
    }

    #[test]
    fn test_activity() {
        let t0 = Instant::now();
        let bucket = LeakyBucket::per_minute(t0, 1, Duration::from_secs(1)).unwrap();
        assert!(bucket.is_active(t0));
        assert!(!bucket.is_active(t0 + Duration::from_secs(2)));

        assert!(bucket.conform(t0 + Duration::from_secs(2)));
        // Content still draining
        assert!(bucket.is_active(t0 + Duration::from_secs(30)));
        // Drained and idle
        assert!(!bucket.is_active(t0 + Duration::from_secs(63)));
    }
}
