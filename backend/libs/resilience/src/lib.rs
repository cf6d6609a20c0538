/// Resilience primitives for provider-facing delivery workers
///
/// This library provides the process-wide protection shared by every worker:
/// - **Circuit Breaker**: fails fast once a dependency keeps failing, probes it after a cooldown
/// - **Rate Limiter**: token bucket gate with deadline-bounded, cancellable acquisition
/// - **Retry**: exponential backoff with additive jitter
/// - **Timeout**: time limits for individual calls
/// - **Preset Configurations**: tuned settings for push providers and the device registry
///
/// # Example: guarded provider call
///
/// ```rust,no_run
/// use resilience::{presets, CircuitBreaker, RateLimiter};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let config = presets::push_provider_config();
///     let breaker = CircuitBreaker::new(config.circuit_breaker);
///     let limiter = RateLimiter::new(config.rate_limit.unwrap_or_default());
///
///     let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
///     if limiter.acquire(1, deadline).await.is_ok() {
///         let _ = breaker
///             .call(|| async {
///                 // Your provider call here
///                 Ok::<_, String>(())
///             })
///             .await;
///     }
/// }
/// ```
pub mod circuit_breaker;
pub mod metrics;
pub mod presets;
pub mod rate_limiter;
pub mod retry;
pub mod timeout;

// Re-export main types for convenience
pub use circuit_breaker::{
    CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState,
};
pub use presets::{push_provider_config, registry_config, ServiceConfig};
pub use rate_limiter::{RateLimitError, RateLimiter, RateLimiterConfig};
pub use retry::{with_retry, RetryConfig, RetryError};
pub use timeout::{with_timeout, TimeoutConfig, TimeoutError};
