#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use push_delivery::{
    Batch, CircuitBreakerConfig, DeliveryProvider, EngineConfig, ProviderEntry, ProviderError,
    ProviderResponse, RateLimiterConfig, Recipient, RetryConfig,
};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Provider double answering from per-recipient scripts.
///
/// Recipients without a script are accepted. Batch-level failures queued with
/// [`ScriptedProvider::fail_next`] are consumed first, one per call.
pub struct ScriptedProvider {
    max_batch_size: usize,
    scripts: Mutex<HashMap<String, VecDeque<ProviderEntry>>>,
    batch_failures: Mutex<VecDeque<ProviderError>>,
    always_fail: Mutex<Option<ProviderError>>,
    payload_rejection: Mutex<Option<String>>,
    latency: Duration,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedProvider {
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            max_batch_size,
            scripts: Mutex::new(HashMap::new()),
            batch_failures: Mutex::new(VecDeque::new()),
            always_fail: Mutex::new(None),
            payload_rejection: Mutex::new(None),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Answers for `id`, one per call that includes it
    pub fn script(&self, id: &str, entries: Vec<ProviderEntry>) {
        self.scripts
            .lock()
            .insert(id.to_string(), entries.into_iter().collect());
    }

    pub fn fail_next(&self, error: ProviderError) {
        self.batch_failures.lock().push_back(error);
    }

    pub fn fail_always(&self, error: ProviderError) {
        *self.always_fail.lock() = Some(error);
    }

    pub fn reject_payload(&self, reason: &str) {
        *self.payload_rejection.lock() = Some(reason.to_string());
    }

    pub fn recover(&self) {
        *self.always_fail.lock() = None;
    }

    /// Recipient ids of every call, in call order
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// How many calls included `id`
    pub fn times_sent(&self, id: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.iter().any(|sent| sent == id))
            .count()
    }
}

#[async_trait]
impl DeliveryProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    fn max_payload_bytes(&self) -> usize {
        4096
    }

    async fn deliver(&self, batch: &Batch) -> Result<ProviderResponse, ProviderError> {
        self.calls.lock().push(
            batch
                .registration_ids()
                .into_iter()
                .map(str::to_string)
                .collect(),
        );

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(error) = self.always_fail.lock().clone() {
            return Err(error);
        }
        if let Some(error) = self.batch_failures.lock().pop_front() {
            return Err(error);
        }
        if let Some(reason) = self.payload_rejection.lock().clone() {
            return Ok(ProviderResponse::PayloadRejected { reason });
        }

        let mut scripts = self.scripts.lock();
        let entries = batch
            .recipients()
            .map(|recipient| {
                scripts
                    .get_mut(&recipient.id)
                    .and_then(VecDeque::pop_front)
                    .unwrap_or_else(|| ProviderEntry::accepted(format!("msg-{}", recipient.id)))
            })
            .collect();

        Ok(ProviderResponse::PerRecipient(entries))
    }
}

/// Recipients `token-0000`, `token-0001`, ...
pub fn recipients(n: usize) -> Vec<Recipient> {
    (0..n)
        .map(|i| Recipient::new(format!("token-{:04}", i)))
        .collect()
}

/// Generous limits and short backoffs so tests exercise logic, not waiting
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        max_batch_size: 10,
        worker_count: 3,
        retry: RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            jitter_window: Duration::ZERO,
        },
        rate_limit: RateLimiterConfig {
            capacity: 100,
            refill_per_sec: 1000.0,
            initial_tokens: 100,
            jitter: Duration::ZERO,
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 50,
            failure_window: Duration::from_secs(30),
            success_threshold: 1,
            timeout: Duration::from_secs(60),
        },
        call_timeout: Duration::from_secs(5),
        acquire_timeout: Duration::from_secs(5),
        default_deadline: Duration::from_secs(60),
        ..EngineConfig::default()
    }
}
