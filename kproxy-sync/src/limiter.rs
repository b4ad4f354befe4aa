use tokio::time::Instant;

/// Admission control for on-demand runs.
pub trait RateLimiter: Send {
    /// Consumes one token if available.
    fn try_accept(&mut self) -> bool;

    /// Releases any resources held by the limiter.
    fn stop(&mut self) {}
}

/// Limiter used when no minimum interval is configured.
pub struct NullLimiter;

impl RateLimiter for NullLimiter {
    fn try_accept(&mut self) -> bool {
        true
    }
}

/// Token bucket refilled continuously from the tokio clock: `qps` tokens per
/// second up to `burst` capacity. Starts full, so up to `burst` admissions
/// can happen back to back before steady-state pacing takes over.
pub struct TokenBucket {
    qps: f64,
    burst: f64,
    tokens: f64,
    last: Instant,
}

impl TokenBucket {
    pub fn new(qps: f64, burst: u32) -> Self {
        Self {
            qps,
            burst: f64::from(burst),
            tokens: f64::from(burst),
            last: Instant::now(),
        }
    }
}

impl RateLimiter for TokenBucket {
    fn try_accept(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.qps).min(self.burst);
        self.last = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_refill() {
        let mut bucket = TokenBucket::new(1.0, 2);
        assert!(bucket.try_accept());
        assert!(bucket.try_accept());
        assert!(!bucket.try_accept());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(bucket.try_accept());
        assert!(!bucket.try_accept());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_caps_at_burst() {
        let mut bucket = TokenBucket::new(1.0, 2);
        assert!(bucket.try_accept());
        assert!(bucket.try_accept());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(bucket.try_accept());
        assert!(bucket.try_accept());
        assert!(!bucket.try_accept());
    }

    #[test]
    fn test_null_limiter_always_accepts() {
        let mut limiter = NullLimiter;
        for _ in 0..16 {
            assert!(limiter.try_accept());
        }
    }
}
