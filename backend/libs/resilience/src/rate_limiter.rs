/// Token bucket rate limiter shared by concurrent workers
///
/// Capacity `C`, refill `R` tokens/second. `acquire(n, deadline)` waits
/// cooperatively on tokio's timer until `n` tokens are available. Waiters line
/// up behind a fair async mutex, so a worker's wait after reaching the head of
/// the line is bounded by `ceil(n / R)` plus jitter.
use crate::metrics::RateLimiterMetrics;
use parking_lot::Mutex;
use rand::Rng;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const TOKEN_EPSILON: f64 = 1e-9;
const MIN_WAIT: Duration = Duration::from_millis(1);
/// Slowest refill accepted; unusable rates are clamped here so the bucket fails closed
pub const MIN_REFILL_PER_SEC: f64 = 1e-3;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum tokens the bucket holds
    pub capacity: u32,
    /// Tokens added per second
    pub refill_per_sec: f64,
    /// Tokens available at construction
    pub initial_tokens: u32,
    /// Upper bound of random delay added to each wait
    pub jitter: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_per_sec: 10.0,
            initial_tokens: 0,
            jitter: Duration::from_millis(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limit: {requested} tokens not available before deadline")]
    Timeout { requested: u32 },
    #[error("Rate limit: {requested} tokens exceeds bucket capacity {capacity}")]
    ExceedsCapacity { requested: u32, capacity: u32 },
    #[error("Rate limit: acquisition cancelled")]
    Cancelled,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, config: &RateLimiterConfig, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * config.refill_per_sec).min(config.capacity as f64);
        self.last_refill = now;
    }
}

pub struct RateLimiter {
    config: RateLimiterConfig,
    bucket: Mutex<Bucket>,
    turnstile: tokio::sync::Mutex<()>,
}

impl RateLimiter {
    pub fn new(mut config: RateLimiterConfig) -> Self {
        let refill = config.refill_per_sec;
        if !(refill.is_finite() && refill >= MIN_REFILL_PER_SEC) {
            warn!(
                refill_per_sec = refill,
                clamped_to = MIN_REFILL_PER_SEC,
                "unusable rate limiter refill rate, clamping"
            );
            config.refill_per_sec = MIN_REFILL_PER_SEC;
        }
        let initial = config.initial_tokens.min(config.capacity) as f64;
        Self {
            bucket: Mutex::new(Bucket {
                tokens: initial,
                last_refill: Instant::now(),
            }),
            turnstile: tokio::sync::Mutex::new(()),
            config,
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Wait until `n` tokens are available or `deadline` passes
    pub async fn acquire(&self, n: u32, deadline: Instant) -> Result<(), RateLimitError> {
        self.acquire_inner(n, deadline, None).await
    }

    /// Like [`RateLimiter::acquire`], also giving up when `cancel` fires
    pub async fn acquire_cancellable(
        &self,
        n: u32,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<(), RateLimitError> {
        self.acquire_inner(n, deadline, Some(cancel)).await
    }

    /// Take `n` tokens without waiting
    pub fn try_acquire(&self, n: u32) -> bool {
        if n > self.config.capacity {
            return false;
        }
        self.take(n).is_none()
    }

    /// Tokens currently in the bucket
    pub fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock();
        bucket.refill(&self.config, Instant::now());
        bucket.tokens
    }

    async fn acquire_inner(
        &self,
        n: u32,
        deadline: Instant,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), RateLimitError> {
        if n > self.config.capacity {
            return Err(RateLimitError::ExceedsCapacity {
                requested: n,
                capacity: self.config.capacity,
            });
        }
        if n == 0 {
            return Ok(());
        }

        let _turn = tokio::select! {
            guard = self.turnstile.lock() => guard,
            _ = sleep_until(deadline) => return Err(self.timed_out(n)),
            _ = cancelled(cancel) => return Err(RateLimitError::Cancelled),
        };

        loop {
            let wait = match self.take(n) {
                None => return Ok(()),
                Some(wait) => wait,
            };

            let ready_at = match Instant::now().checked_add(wait) {
                Some(at) if at <= deadline => at,
                _ => return Err(self.timed_out(n)),
            };

            let wake = (ready_at + self.jitter()).min(deadline);
            debug!(requested = n, wait_ms = wait.as_millis() as u64, "rate limiter waiting");

            tokio::select! {
                _ = sleep_until(wake) => {}
                _ = cancelled(cancel) => return Err(RateLimitError::Cancelled),
            }
        }
    }

    /// Consume `n` tokens, or return how long until they will exist
    fn take(&self, n: u32) -> Option<Duration> {
        let mut bucket = self.bucket.lock();
        bucket.refill(&self.config, Instant::now());

        let needed = n as f64;
        if bucket.tokens + TOKEN_EPSILON >= needed {
            bucket.tokens = (bucket.tokens - needed).max(0.0);
            return None;
        }

        let missing = needed - bucket.tokens;
        let wait = Duration::try_from_secs_f64(missing / self.config.refill_per_sec)
            .unwrap_or(Duration::MAX);
        Some(wait.max(MIN_WAIT))
    }

    fn jitter(&self) -> Duration {
        if self.config.jitter.is_zero() {
            return Duration::ZERO;
        }
        rand::thread_rng().gen_range(Duration::ZERO..self.config.jitter)
    }

    fn timed_out(&self, n: u32) -> RateLimitError {
        warn!(requested = n, "rate limiter deadline elapsed before tokens were available");
        RateLimiterMetrics::record_timeout();
        RateLimitError::Timeout { requested: n }
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(capacity: u32, rate: f64, initial: u32) -> RateLimiter {
        RateLimiter::new(RateLimiterConfig {
            capacity,
            refill_per_sec: rate,
            initial_tokens: initial,
            jitter: Duration::ZERO,
        })
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(3600)
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_immediate_when_tokens_available() {
        let rl = limiter(10, 10.0, 10);
        let start = Instant::now();

        for _ in 0..10 {
            rl.acquire(1, far_deadline()).await.unwrap();
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(!rl.try_acquire(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_bucket_is_bounded_by_refill_rate() {
        let rl = limiter(10, 10.0, 0);
        let start = Instant::now();

        for _ in 0..10 {
            rl.acquire(1, far_deadline()).await.unwrap();
        }

        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_all_complete() {
        let rl = Arc::new(limiter(10, 10.0, 0));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let rl = rl.clone();
            handles.push(tokio::spawn(async move { rl.acquire(1, far_deadline()).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert!(start.elapsed() >= Duration::from_millis(900));
        assert!(start.elapsed() < Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_does_not_consume_tokens() {
        let rl = limiter(10, 1.0, 2);

        let result = rl
            .acquire(5, Instant::now() + Duration::from_millis(500))
            .await;

        assert_eq!(result, Err(RateLimitError::Timeout { requested: 5 }));
        assert!(rl.try_acquire(2));
    }

    #[tokio::test]
    async fn test_request_over_capacity_fails_fast() {
        let rl = limiter(3, 1.0, 3);
        let result = rl.acquire(4, far_deadline()).await;
        assert_eq!(
            result,
            Err(RateLimitError::ExceedsCapacity {
                requested: 4,
                capacity: 3
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_wakes_waiter() {
        let rl = Arc::new(limiter(1, 0.1, 0));
        let cancel = CancellationToken::new();

        let waiter = {
            let rl = rl.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { rl.acquire_cancellable(1, far_deadline(), &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        assert_eq!(waiter.await.unwrap(), Err(RateLimitError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unusable_refill_rate_is_clamped() {
        for rate in [f64::NAN, f64::INFINITY, -5.0, 0.0] {
            let rl = limiter(4, rate, 0);
            assert_eq!(rl.config().refill_per_sec, MIN_REFILL_PER_SEC);

            let result = rl
                .acquire(1, Instant::now() + Duration::from_secs(1))
                .await;
            assert_eq!(result, Err(RateLimitError::Timeout { requested: 1 }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_caps_at_capacity() {
        let rl = limiter(5, 100.0, 0);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!((rl.available() - 5.0).abs() < 1e-6);
    }
}
