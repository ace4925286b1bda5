//! Per-provider token bucket
//!
//! Implemented as a generic cell rate algorithm over a single atomic: the
//! bucket state is the "theoretical arrival time" of the next request, in
//! nanoseconds since the limiter was created. Reserving a token is a CAS loop,
//! so the limiter is safe to share between tasks without any outer lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Token bucket refilled continuously at `rate` tokens per second
#[derive(Debug)]
pub struct RateLimiter {
    origin: Instant,
    /// Time between two tokens
    interval_nanos: u64,
    /// How far ahead of `now` the schedule may run before callers must wait
    burst_nanos: u64,
    /// Theoretical arrival time of the next request
    tat_nanos: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter allowing `requests_per_second` with bursts of `burst`
    ///
    /// Non-positive rates and a zero burst are clamped to the smallest usable
    /// values; the configuration layer rejects them before they get here.
    pub fn new(requests_per_second: f64, burst: u32) -> Self {
        let rate = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            requests_per_second
        } else {
            f64::MIN_POSITIVE
        };
        let interval = Duration::try_from_secs_f64(1.0 / rate).unwrap_or(Duration::MAX);
        let interval_nanos = u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX).max(1);
        let burst_nanos = interval_nanos.saturating_mul(u64::from(burst.max(1)));

        Self {
            origin: Instant::now(),
            interval_nanos,
            burst_nanos,
            tat_nanos: AtomicU64::new(0),
        }
    }

    fn now_nanos(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Reserve one token, returning how long the caller must wait before using it
    ///
    /// The reservation is committed immediately, so concurrent callers are
    /// queued fairly behind each other.
    pub fn reserve(&self) -> Duration {
        let now = self.now_nanos();
        let mut current = self.tat_nanos.load(Ordering::Acquire);
        loop {
            let next = current.max(now).saturating_add(self.interval_nanos);
            match self.tat_nanos.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    let wait = next.saturating_sub(now).saturating_sub(self.burst_nanos);
                    return Duration::from_nanos(wait);
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Take a token without waiting, if one is available
    pub fn try_acquire(&self) -> bool {
        let now = self.now_nanos();
        let mut current = self.tat_nanos.load(Ordering::Acquire);
        loop {
            let next = current.max(now).saturating_add(self.interval_nanos);
            if next.saturating_sub(now) > self.burst_nanos {
                return false;
            }
            match self.tat_nanos.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Wait until a token is available
    pub async fn acquire(&self) {
        let wait = self.reserve();
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_available_immediately() {
        let limiter = RateLimiter::new(1.0, 3);
        assert_eq!(limiter.reserve(), Duration::ZERO);
        assert_eq!(limiter.reserve(), Duration::ZERO);
        assert_eq!(limiter.reserve(), Duration::ZERO);
        assert_eq!(limiter.reserve(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reservations_queue_behind_each_other() {
        let limiter = RateLimiter::new(2.0, 1);
        assert_eq!(limiter.reserve(), Duration::ZERO);
        assert_eq!(limiter.reserve(), Duration::from_millis(500));
        assert_eq!(limiter.reserve(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_refills_over_time() {
        let limiter = RateLimiter::new(1.0, 1);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_time_does_not_exceed_burst() {
        let limiter = RateLimiter::new(1.0, 2);
        tokio::time::advance(Duration::from_secs(60)).await;

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_refill() {
        let limiter = RateLimiter::new(1.0, 1);
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }
}
