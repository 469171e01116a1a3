//! Token bucket admission control.

use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::Error;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Token bucket parameters: up to `capacity` tokens, one token added every
/// `refill_interval`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateBudget {
    capacity: u32,
    refill_interval: Duration,
}

impl RateBudget {
    /// Capacity and interval are clamped to at least one token and one
    /// nanosecond respectively.
    pub fn new(capacity: u32, refill_interval: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            refill_interval: refill_interval.max(Duration::from_nanos(1)),
        }
    }

    /// Budget admitting at most `requests` calls in any one-second window.
    ///
    /// Admissions are spaced evenly instead of allowing a burst, the interval
    /// is rounded up so `requests` intervals never add up to less than a
    /// second.
    pub fn per_second(requests: u32) -> Self {
        let requests = u64::from(requests.max(1));
        Self::new(1, Duration::from_nanos(NANOS_PER_SEC.div_ceil(requests)))
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, budget: &RateBudget, now: Instant) {
        if self.tokens >= budget.capacity {
            self.last_refill = now;
            return;
        }
        let elapsed = now.saturating_duration_since(self.last_refill);
        let earned = elapsed.as_nanos() / budget.refill_interval.as_nanos();
        if earned == 0 {
            return;
        }
        let earned = u32::try_from(earned).unwrap_or(u32::MAX);
        self.tokens = self.tokens.saturating_add(earned).min(budget.capacity);
        if self.tokens == budget.capacity {
            self.last_refill = now;
        } else {
            // earned < capacity here, the multiplication can not overflow
            self.last_refill += budget.refill_interval * earned;
        }
    }
}

/// Token bucket shared by all calls of one client.
///
/// The bucket starts full. Time is read through [`tokio::time`], so a
/// paused test runtime drives it deterministically.
#[derive(Debug)]
pub struct RateLimiter {
    budget: RateBudget,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(budget: RateBudget) -> Self {
        Self {
            budget,
            bucket: Mutex::new(Bucket {
                tokens: budget.capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn per_second(requests: u32) -> Self {
        Self::new(RateBudget::per_second(requests))
    }

    pub fn budget(&self) -> RateBudget {
        self.budget
    }

    /// Tokens currently available.
    pub fn available(&self) -> u32 {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.refill(&self.budget, Instant::now());
        bucket.tokens
    }

    /// Takes a token if one is available, otherwise returns the time until
    /// the next one is due.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.refill(&self.budget, now);
        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            return Ok(());
        }
        let since_refill = now.saturating_duration_since(bucket.last_refill);
        Err(self.budget.refill_interval.saturating_sub(since_refill))
    }

    /// Waits for a token.
    ///
    /// Fails with [`Error::Cancelled`] without consuming a token once the
    /// cancellation token fires.
    pub async fn acquire(&self, token: &CancellationToken) -> Result<(), Error> {
        loop {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let wait = match self.try_acquire() {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };
            trace!(?wait, "waiting for rate limit token");
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[test]
    fn test_per_second_interval_rounds_up() {
        assert_eq!(
            RateBudget::per_second(3).refill_interval(),
            Duration::from_nanos(333_333_334)
        );
        assert_eq!(RateBudget::per_second(0), RateBudget::per_second(1));
        assert_eq!(RateBudget::per_second(15).capacity(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_more_than_n_per_rolling_second() {
        const RATE: usize = 5;
        let limiter = RateLimiter::per_second(RATE as u32);
        let token = CancellationToken::new();

        let mut admitted = Vec::new();
        for _ in 0..RATE * 4 {
            assert_ok!(limiter.acquire(&token).await);
            admitted.push(Instant::now());
        }

        for window in admitted.windows(RATE + 1) {
            let span = window[RATE] - window[0];
            assert!(span >= Duration::from_secs(1), "{} admissions in {span:?}", RATE + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_capacity() {
        let limiter = RateLimiter::new(RateBudget::new(3, Duration::from_millis(100)));
        let start = Instant::now();

        assert_ok!(limiter.try_acquire());
        assert_ok!(limiter.try_acquire());
        assert_ok!(limiter.try_acquire());
        assert_eq!(limiter.available(), 0);
        assert_eq!(assert_err!(limiter.try_acquire()), Duration::from_millis(100));

        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(limiter.available(), 2);
        assert_ok!(limiter.try_acquire());
        assert_ok!(limiter.try_acquire());
        assert_eq!(assert_err!(limiter.try_acquire()), Duration::from_millis(50));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(limiter.available(), 3);
        assert!(Instant::now() - start >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_cancelled() {
        let limiter = RateLimiter::per_second(1);
        let token = CancellationToken::new();
        assert_ok!(limiter.acquire(&token).await);

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });

        assert!(matches!(limiter.acquire(&token).await, Err(Error::Cancelled)));
        // no token was granted on cancellation
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test]
    async fn test_acquire_fails_when_already_cancelled() {
        let limiter = RateLimiter::per_second(10);
        let token = CancellationToken::new();
        token.cancel();

        assert!(matches!(limiter.acquire(&token).await, Err(Error::Cancelled)));
        assert_eq!(limiter.available(), 1);
    }
}
