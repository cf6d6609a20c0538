use crate::error::{DeliveryError, Result};
use crate::validator::ValidatorConfig;
use resilience::{
    push_provider_config, registry_config, CircuitBreakerConfig, RateLimiterConfig, RetryConfig,
};
use std::time::Duration;

/// Engine tuning. Batch and payload limits are further capped by the
/// provider's declared maximums.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_batch_size: usize,
    pub max_payload_bytes: usize,
    pub worker_count: usize,
    pub retry: RetryConfig,
    pub rate_limit: RateLimiterConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    /// Time limit for one provider call
    pub call_timeout: Duration,
    /// Longest a worker waits for a rate-limit token
    pub acquire_timeout: Duration,
    /// Time limit for each registry update
    pub registry_timeout: Duration,
    /// Deadline applied when the caller supplies none
    pub default_deadline: Duration,
    pub validator: ValidatorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let provider = push_provider_config();
        let registry = registry_config();

        Self {
            max_batch_size: 500,
            max_payload_bytes: 4096,
            worker_count: 4,
            retry: provider.retry.unwrap_or_default(),
            rate_limit: provider.rate_limit.unwrap_or_default(),
            circuit_breaker: provider.circuit_breaker,
            call_timeout: provider.timeout.duration,
            acquire_timeout: Duration::from_secs(5),
            registry_timeout: registry.timeout.duration,
            default_deadline: Duration::from_secs(120),
            validator: ValidatorConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(DeliveryError::configuration("max_batch_size must be positive"));
        }
        if self.max_payload_bytes == 0 {
            return Err(DeliveryError::configuration(
                "max_payload_bytes must be positive",
            ));
        }
        if self.worker_count == 0 {
            return Err(DeliveryError::configuration("worker_count must be positive"));
        }
        let refill = self.rate_limit.refill_per_sec;
        if self.rate_limit.capacity == 0 || !(refill.is_finite() && refill > 0.0) {
            return Err(DeliveryError::configuration(format!(
                "rate limit needs a positive capacity and a finite positive refill rate (got {})",
                refill
            )));
        }
        if self.rate_limit.initial_tokens > self.rate_limit.capacity {
            return Err(DeliveryError::configuration(
                "rate limit initial tokens exceed capacity",
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(DeliveryError::configuration(
                "circuit breaker failure_threshold must be positive",
            ));
        }
        let multiplier = self.retry.backoff_multiplier;
        if !(multiplier.is_finite() && multiplier >= 1.0) {
            return Err(DeliveryError::configuration(format!(
                "retry backoff multiplier must be finite and at least 1.0 (got {})",
                multiplier
            )));
        }
        if self.validator.min_len > self.validator.max_len {
            return Err(DeliveryError::configuration(
                "validator min_len exceeds max_len",
            ));
        }
        if self.call_timeout.is_zero() {
            return Err(DeliveryError::configuration("call_timeout must be non-zero"));
        }
        Ok(())
    }
}
