//! Token bucket rate limiting

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

/// Allows `qps` operations per second with bursts of up to `burst`.
///
/// The bucket starts full.
#[derive(Debug)]
pub struct TokenBucketRateLimiter {
    qps: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl TokenBucketRateLimiter {
    pub fn new(qps: f32, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            qps: f64::from(qps).max(0.0),
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last: Instant::now(),
            }),
        }
    }

    pub fn qps(&self) -> f32 {
        self.qps as f32
    }

    pub fn burst(&self) -> u32 {
        self.burst as u32
    }

    /// Takes a token if one is available.
    pub fn try_accept(&self) -> bool {
        self.take().is_none()
    }

    /// Waits until a token is available and takes it.
    pub async fn accept(&self) {
        while let Some(wait) = self.take() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Returns `None` when a token was taken, otherwise how long until the next one.
    fn take(&self) -> Option<Duration> {
        let mut bucket = self.bucket.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.qps).min(self.burst);
        bucket.last = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return None;
        }
        if self.qps <= 0.0 {
            return Some(Duration::from_secs(3600));
        }
        Some(Duration::from_secs_f64((1.0 - bucket.tokens) / self.qps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_refill() {
        let limiter = TokenBucketRateLimiter::new(0.1, 10);
        for _ in 0..10 {
            assert!(limiter.try_accept());
        }
        assert!(!limiter.try_accept());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(limiter.try_accept());
        assert!(!limiter.try_accept());
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_waits() {
        let limiter = TokenBucketRateLimiter::new(1.0, 1);
        limiter.accept().await;

        let start = Instant::now();
        limiter.accept().await;
        assert!(start.elapsed() >= Duration::from_millis(999));
    }

    #[test]
    fn test_accessors() {
        let limiter = TokenBucketRateLimiter::new(0.1, 10);
        assert!((limiter.qps() - 0.1).abs() < 1e-6);
        assert_eq!(limiter.burst(), 10);
    }
}
