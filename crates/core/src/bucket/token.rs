//! Token bucket with lazy refill
//!
//! A bucket starts full (`count == limit`) and regenerates one token per
//! `refill_interval`. Regeneration is computed on inspection only: no timer
//! exists per bucket, so an idle bucket costs nothing but its memory.

use super::{Bucket, MINUTE};
use crate::{CoreError, Result};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Mutable part of a bucket, guarded by one mutex
#[derive(Debug)]
struct TokenState {
    /// Tokens currently available (0..=limit)
    count: u32,
    /// Refill anchor: last successful consumption, moved forward by credited intervals
    last_conform: Instant,
    /// Last time the bucket was asked to conform
    last_active: Instant,
}

impl TokenState {
    /// Credit whole intervals elapsed since the anchor, never past `limit`
    fn refill(&mut self, now: Instant, limit: u32, refill_interval: Duration) {
        let missing = limit - self.count;
        if missing == 0 {
            return;
        }

        // Clock moving backwards yields zero elapsed
        let elapsed = now.saturating_duration_since(self.last_conform);
        let released = elapsed.as_nanos() / refill_interval.as_nanos();
        if released == 0 {
            return;
        }

        let released = released.min(u128::from(missing)) as u32;
        self.count += released;
        // Advance by exactly what was credited so re-inspection at the same
        // instant releases nothing more
        self.last_conform += refill_interval * released;
    }
}

/// Token bucket rate limiter
#[derive(Debug)]
pub struct TokenBucket {
    limit: u32,
    refill_interval: Duration,
    active_timeout: Duration,
    state: Mutex<TokenState>,
}

impl TokenBucket {
    /// Create a full bucket
    ///
    /// # Errors
    /// - `InvalidConfig` if `limit` is zero or `refill_interval` is zero
    pub fn new(
        now: Instant,
        limit: u32,
        refill_interval: Duration,
        active_timeout: Duration,
    ) -> Result<Self> {
        if limit == 0 {
            return Err(CoreError::InvalidConfig(
                "bucket limit must be greater than zero".into(),
            ));
        }
        if refill_interval.is_zero() {
            return Err(CoreError::InvalidConfig(
                "bucket refill interval must be greater than zero".into(),
            ));
        }

        Ok(Self {
            limit,
            refill_interval,
            active_timeout,
            state: Mutex::new(TokenState {
                count: limit,
                last_conform: now,
                last_active: now,
            }),
        })
    }

    /// Create a full bucket admitting `limit` requests per minute
    ///
    /// `refill_interval = 1 minute / limit`, floored at one nanosecond.
    pub fn per_minute(now: Instant, limit: u32, active_timeout: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(CoreError::InvalidConfig(
                "bucket limit must be greater than zero".into(),
            ));
        }
        let refill_interval = (MINUTE / limit).max(Duration::from_nanos(1));
        Self::new(now, limit, refill_interval, active_timeout)
    }

    /// Bucket capacity
    #[cfg(test)]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Time needed to regenerate one token
    #[cfg(test)]
    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    /// Tokens available at `now` (applies the lazy refill)
    #[cfg(test)]
    pub fn available(&self, now: Instant) -> u32 {
        let mut state = self.state.lock();
        state.refill(now, self.limit, self.refill_interval);
        state.count
    }
}

impl Bucket for TokenBucket {
    fn conform(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        state.refill(now, self.limit, self.refill_interval);
        state.last_active = now;

        if state.count > 0 {
            state.count -= 1;
            state.last_conform = now;
            return true;
        }

        false
    }

    fn is_active(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        state.refill(now, self.limit, self.refill_interval);

        state.count < self.limit
            || now.saturating_duration_since(state.last_active) <= self.active_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    const TIMEOUT: Duration = Duration::from_secs(120);

    #[test]
    fn test_zero_limit_rejected() {
        let now = Instant::now();
        assert!(matches!(
            TokenBucket::per_minute(now, 0, TIMEOUT),
            Err(CoreError::InvalidConfig(_))
        ));
        assert!(matches!(
            TokenBucket::new(now, 0, Duration::from_secs(1), TIMEOUT),
            Err(CoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = TokenBucket::new(Instant::now(), 5, Duration::ZERO, TIMEOUT);
        assert!(matches!(result, Err(CoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_refill_interval_per_minute() {
        let bucket = TokenBucket::per_minute(Instant::now(), 10, TIMEOUT).unwrap();
        assert_eq!(bucket.refill_interval(), Duration::from_secs(6));
        assert_eq!(bucket.limit(), 10);
    }

    #[test]
    fn test_full_burst_then_deny() {
        let t0 = Instant::now();
        for limit in [1u32, 2, 10, 100] {
            let bucket = TokenBucket::per_minute(t0, limit, TIMEOUT).unwrap();
            for i in 0..limit {
                assert!(bucket.conform(t0), "request {} of {} should conform", i + 1, limit);
            }
            assert!(!bucket.conform(t0), "request {} should be denied", limit + 1);
        }
    }

    #[test]
    fn test_one_token_per_interval() {
        let t0 = Instant::now();
        let bucket = TokenBucket::per_minute(t0, 10, TIMEOUT).unwrap();
        let interval = bucket.refill_interval();

        for _ in 0..10 {
            assert!(bucket.conform(t0));
        }
        assert!(!bucket.conform(t0));

        // Just short of one interval: still empty
        assert!(!bucket.conform(t0 + interval - Duration::from_nanos(1)));
        assert!(bucket.conform(t0 + interval));
        assert!(!bucket.conform(t0 + interval));
    }

    #[test]
    fn test_partial_refill_never_exceeds_limit() {
        let t0 = Instant::now();
        let bucket = TokenBucket::per_minute(t0, 10, TIMEOUT).unwrap();
        let interval = bucket.refill_interval();

        for _ in 0..10 {
            assert!(bucket.conform(t0));
        }

        assert_eq!(bucket.available(t0 + interval * 9), 9);
        assert_eq!(bucket.available(t0 + interval * 50), 10);
    }

    #[test]
    fn test_refill_is_idempotent_at_same_instant() {
        let t0 = Instant::now();
        let bucket = TokenBucket::per_minute(t0, 10, TIMEOUT).unwrap();
        let interval = bucket.refill_interval();

        for _ in 0..10 {
            bucket.conform(t0);
        }

        let later = t0 + interval * 3;
        assert_eq!(bucket.available(later), 3);
        assert!(bucket.is_active(later));
        assert_eq!(bucket.available(later), 3);
    }

    #[test]
    fn test_clock_going_backwards() {
        let t0 = Instant::now() + Duration::from_secs(3600);
        let bucket = TokenBucket::per_minute(t0, 1, TIMEOUT).unwrap();
        assert!(bucket.conform(t0));
        // Earlier instant: no tokens credited, no panic
        assert!(!bucket.conform(t0 - Duration::from_secs(600)));
        assert_eq!(bucket.available(t0 - Duration::from_secs(600)), 0);
    }

    #[test]
    fn test_active_after_creation() {
        let t0 = Instant::now();
        let bucket = TokenBucket::per_minute(t0, 10, TIMEOUT).unwrap();
        assert!(bucket.is_active(t0));
        assert!(bucket.is_active(t0 + TIMEOUT));
    }

    #[test]
    fn test_idle_after_timeout() {
        let t0 = Instant::now();
        let bucket = TokenBucket::per_minute(t0, 10, TIMEOUT).unwrap();
        assert!(!bucket.is_active(t0 + TIMEOUT + Duration::from_nanos(1)));
    }

    #[test]
    fn test_active_while_refilling() {
        let t0 = Instant::now();
        // One token per hour, idle timeout of one second
        let bucket =
            TokenBucket::new(t0, 1, Duration::from_secs(3600), Duration::from_secs(1)).unwrap();
        assert!(bucket.conform(t0));

        // Timeout long passed but bucket still owes a token
        assert!(bucket.is_active(t0 + Duration::from_secs(60)));
        // Fully refilled and idle
        assert!(!bucket.is_active(t0 + Duration::from_secs(3600)));
    }

    #[test]
    fn test_denied_request_counts_as_activity() {
        let t0 = Instant::now();
        let bucket =
            TokenBucket::new(t0, 1, Duration::from_secs(10), Duration::from_secs(30)).unwrap();
        assert!(bucket.conform(t0));
        assert!(!bucket.conform(t0 + Duration::from_secs(5)));

        // Refilled at t0+10s, but last activity at t0+5s keeps it alive until t0+35s
        assert!(bucket.is_active(t0 + Duration::from_secs(35)));
        assert!(!bucket.is_active(t0 + Duration::from_secs(36)));
    }

    #[test]
    fn test_concurrent_conform_exact() {
        const N: usize = 64;
        let t0 = Instant::now();
        let bucket = Arc::new(TokenBucket::per_minute(t0, N as u32, TIMEOUT).unwrap());
        let barrier = Arc::new(Barrier::new(N + 1));

        let handles: Vec<_> = (0..=N)
            .map(|_| {
                let bucket = Arc::clone(&bucket);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    bucket.conform(t0)
                })
            })
            .collect();

        let allowed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(allowed, N);
    }
}
