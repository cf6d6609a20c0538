/// Preset configurations for the dependencies a push delivery process talks to
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::rate_limiter::RateLimiterConfig;
use crate::retry::RetryConfig;
use crate::timeout::TimeoutConfig;
use std::time::Duration;

/// Configuration bundle for a dependency
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub timeout: TimeoutConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: Option<RetryConfig>,
    pub rate_limit: Option<RateLimiterConfig>,
}

/// Push delivery provider (FCM-class HTTP API)
///
/// - Timeout: 10s per batch call
/// - Circuit breaker: 5 failures in 30s, 60s cooldown, single probe
/// - Retry: 3 rounds, 500ms base doubling to 30s, up to 250ms jitter
/// - Rate limit: 20 calls burst, 20 calls/s
pub fn push_provider_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(10),
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 5,
            failure_window: Duration::from_secs(30),
            success_threshold: 1,
            timeout: Duration::from_secs(60),
        },
        retry: Some(RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_window: Duration::from_millis(250),
        }),
        rate_limit: Some(RateLimiterConfig {
            capacity: 20,
            refill_per_sec: 20.0,
            initial_tokens: 0,
            jitter: Duration::from_millis(10),
        }),
    }
}

/// Device registry writes (PostgreSQL)
///
/// - Timeout: 5s (single-row updates should be fast)
/// - Circuit breaker: 10 failures in 60s, 30s cooldown
/// - Retry: 2 attempts (updates are idempotent)
pub fn registry_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(5),
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 10,
            failure_window: Duration::from_secs(60),
            success_threshold: 2,
            timeout: Duration::from_secs(30),
        },
        retry: Some(RetryConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter_window: Duration::from_millis(25),
        }),
        rate_limit: None,
    }
}
