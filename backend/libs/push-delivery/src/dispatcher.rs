/// Dispatch Worker Pool
///
/// A fixed number of workers drain one round's batch queue. Before each
/// provider call a worker takes a token from the shared [`RateLimiter`] and a
/// permit from the shared [`CircuitBreaker`]; the provider's answer is mapped
/// through [`classify_response`].
///
/// Cancellation stops workers from starting new batches; calls already on the
/// wire run to completion, bounded by the call timeout. The request deadline
/// bounds token waits. Each provider call runs in its own task, so a panicking
/// provider only fails the batch it was handling.
use crate::classify::{all_transient, classify_response, Classified};
use crate::model::{Admitted, DeliveryOutcome};
use crate::engine::deadline_after;
use crate::planner::{Batch, BatchId};
use crate::provider::{DeliveryProvider, ProviderError, ProviderResponse};
use parking_lot::Mutex;
use resilience::{with_timeout, CircuitBreaker, RateLimitError, RateLimiter};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Concurrent workers, bounding provider-facing concurrency
    pub workers: usize,
    /// Time limit for one provider call
    pub call_timeout: Duration,
    /// Longest a worker waits for a rate-limit token
    pub acquire_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            call_timeout: Duration::from_secs(10),
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Why a batch did not get a structured provider answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchFailure {
    RateLimited(String),
    CircuitOpen,
    Provider(String),
}

/// Per-recipient outcomes for every recipient of one batch
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub batch_id: BatchId,
    pub outcomes: Vec<(Admitted, DeliveryOutcome)>,
    pub failure: Option<BatchFailure>,
    pub completed_at: Instant,
}

impl BatchResult {
    fn new(batch: Batch, classified: Classified, failure: Option<BatchFailure>) -> Self {
        Self {
            batch_id: batch.id,
            outcomes: batch.entries.into_iter().zip(classified.outcomes).collect(),
            failure,
            completed_at: Instant::now(),
        }
    }
}

#[derive(Debug, Default)]
pub struct DispatchRound {
    pub results: Vec<BatchResult>,
    /// Batches no worker started, because of cancellation or the deadline
    pub unstarted: Vec<Batch>,
}

#[derive(Default)]
struct WorkerOutput {
    results: Vec<BatchResult>,
    unstarted: Vec<Batch>,
}

enum Step {
    Sent(BatchResult),
    NotStarted(Batch),
}

#[derive(Clone)]
pub struct DispatchWorkerPool {
    provider: Arc<dyn DeliveryProvider>,
    limiter: Arc<RateLimiter>,
    breaker: CircuitBreaker,
    settings: DispatchSettings,
}

impl DispatchWorkerPool {
    pub fn new(
        provider: Arc<dyn DeliveryProvider>,
        limiter: Arc<RateLimiter>,
        breaker: CircuitBreaker,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            provider,
            limiter,
            breaker,
            settings,
        }
    }

    pub fn with_workers(&self, workers: usize) -> Self {
        let mut pool = self.clone();
        pool.settings.workers = workers;
        pool
    }

    /// Send every batch, returning results for those that were started
    pub async fn dispatch(
        &self,
        batches: Vec<Batch>,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> DispatchRound {
        if batches.is_empty() {
            return DispatchRound::default();
        }

        let total = batches.len();
        let workers = self.settings.workers.clamp(1, total);
        let queue = Arc::new(Mutex::new(VecDeque::from(batches)));

        info!(
            provider = self.provider.name(),
            batches = total,
            workers,
            "dispatching round"
        );

        let mut set = JoinSet::new();
        for worker in 0..workers {
            let pool = self.clone();
            let queue = queue.clone();
            let cancel = cancel.clone();
            set.spawn(async move { pool.run_worker(worker, queue, deadline, cancel).await });
        }

        let mut round = DispatchRound::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(output) => {
                    round.results.extend(output.results);
                    round.unstarted.extend(output.unstarted);
                }
                Err(e) => error!("dispatch worker task failed: {}", e),
            }
        }

        // Whatever is still queued was never picked up
        round.unstarted.extend(queue.lock().drain(..));

        round.results.sort_by_key(|r| r.batch_id.index);
        round.unstarted.sort_by_key(|b| b.id.index);
        round
    }

    async fn run_worker(
        &self,
        worker: usize,
        queue: Arc<Mutex<VecDeque<Batch>>>,
        deadline: Instant,
        cancel: CancellationToken,
    ) -> WorkerOutput {
        let mut output = WorkerOutput::default();

        loop {
            if cancel.is_cancelled() || Instant::now() >= deadline {
                break;
            }

            let next = queue.lock().pop_front();
            let Some(batch) = next else {
                break;
            };

            match self.send_batch(worker, batch, deadline, &cancel).await {
                Step::Sent(result) => output.results.push(result),
                Step::NotStarted(batch) => {
                    output.unstarted.push(batch);
                    break;
                }
            }
        }

        output
    }

    async fn send_batch(
        &self,
        worker: usize,
        batch: Batch,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Step {
        let acquire_deadline = deadline.min(deadline_after(self.settings.acquire_timeout));

        match self
            .limiter
            .acquire_cancellable(1, acquire_deadline, cancel)
            .await
        {
            Ok(()) => {}
            Err(RateLimitError::Cancelled) => return Step::NotStarted(batch),
            Err(_) if Instant::now() >= deadline => return Step::NotStarted(batch),
            Err(e) => {
                warn!(worker, batch = %batch.id, "rate limit wait failed: {}", e);
                let classified = all_transient(&batch, e.to_string());
                return Step::Sent(BatchResult::new(
                    batch,
                    classified,
                    Some(BatchFailure::RateLimited(e.to_string())),
                ));
            }
        }

        let permit = match self.breaker.try_acquire() {
            Ok(permit) => permit,
            Err(e) => {
                debug!(worker, batch = %batch.id, "circuit open, skipping provider call");
                let classified = all_transient(&batch, e.to_string());
                return Step::Sent(BatchResult::new(
                    batch,
                    classified,
                    Some(BatchFailure::CircuitOpen),
                ));
            }
        };

        debug!(
            worker,
            batch = %batch.id,
            recipients = batch.len(),
            probe = permit.is_probe(),
            "sending batch"
        );

        let response = self.call_provider(worker, &batch).await;

        let failure = response
            .as_ref()
            .err()
            .map(|e| BatchFailure::Provider(e.to_string()));
        if let Some(BatchFailure::Provider(reason)) = &failure {
            warn!(worker, batch = %batch.id, "provider call failed: {}", reason);
        }

        let classified = classify_response(&batch, response);
        permit.record(!classified.provider_failure);

        Step::Sent(BatchResult::new(batch, classified, failure))
    }

    async fn call_provider(
        &self,
        worker: usize,
        batch: &Batch,
    ) -> Result<ProviderResponse, ProviderError> {
        let call_timeout = self.settings.call_timeout;
        let provider = self.provider.clone();
        let call_batch = batch.clone();
        let mut call = tokio::spawn(async move { provider.deliver(&call_batch).await });

        match with_timeout(call_timeout, &mut call).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!(worker, batch = %batch.id, "provider call task failed: {}", e);
                Err(ProviderError::Network(format!("provider task failed: {}", e)))
            }
            Err(_) => {
                call.abort();
                Err(ProviderError::Timeout(call_timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NotificationPayload, Recipient};
    use crate::planner::plan;
    use crate::provider::ProviderEntry;
    use async_trait::async_trait;
    use resilience::{CircuitBreakerConfig, RateLimiterConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl DeliveryProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn max_batch_size(&self) -> usize {
            10
        }

        fn max_payload_bytes(&self) -> usize {
            4096
        }

        async fn deliver(&self, batch: &Batch) -> Result<ProviderResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::Network("connection reset".to_string()));
            }
            Ok(ProviderResponse::PerRecipient(
                batch.entries.iter().map(|_| ProviderEntry::accepted("m")).collect(),
            ))
        }
    }

    fn batches(n: usize, size: usize) -> Vec<Batch> {
        let admitted = (0..n)
            .map(|position| Admitted {
                position,
                recipient: Recipient::new(format!("token-{:04}", position)),
            })
            .collect();
        plan(admitted, Arc::new(NotificationPayload::new("t", "b")), size, 0).unwrap()
    }

    /// Answers every recipient after `latency`; panics on the batch at `panic_on`
    struct ScriptedProvider {
        latency: Duration,
        panic_on: Option<usize>,
    }

    #[async_trait]
    impl DeliveryProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn max_batch_size(&self) -> usize {
            10
        }

        fn max_payload_bytes(&self) -> usize {
            4096
        }

        async fn deliver(&self, batch: &Batch) -> Result<ProviderResponse, ProviderError> {
            tokio::time::sleep(self.latency).await;
            if self.panic_on == Some(batch.id.index) {
                panic!("provider blew up on batch {}", batch.id);
            }
            Ok(ProviderResponse::PerRecipient(
                batch.entries.iter().map(|_| ProviderEntry::accepted("m")).collect(),
            ))
        }
    }

    fn warm_limiter() -> RateLimiterConfig {
        RateLimiterConfig {
            capacity: 10,
            refill_per_sec: 10.0,
            initial_tokens: 10,
            jitter: Duration::ZERO,
        }
    }

    fn pool_with(
        provider: Arc<dyn DeliveryProvider>,
        limiter: RateLimiterConfig,
        breaker: CircuitBreaker,
        settings: DispatchSettings,
    ) -> DispatchWorkerPool {
        DispatchWorkerPool::new(provider, Arc::new(RateLimiter::new(limiter)), breaker, settings)
    }

    fn pool(provider: Arc<CountingProvider>, breaker: CircuitBreaker) -> DispatchWorkerPool {
        pool_with(provider, warm_limiter(), breaker, DispatchSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_batch_gets_a_result() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let pool = pool(provider.clone(), CircuitBreaker::new(CircuitBreakerConfig::default()));

        let round = pool
            .dispatch(
                batches(25, 10),
                Instant::now() + Duration::from_secs(60),
                &CancellationToken::new(),
            )
            .await;

        assert!(round.unstarted.is_empty());
        let indexes: Vec<usize> = round.results.iter().map(|r| r.batch_id.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert_eq!(
            round.results.iter().map(|r| r.outcomes.len()).sum::<usize>(),
            25
        );
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_round_starts_nothing() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let pool = pool(provider.clone(), CircuitBreaker::new(CircuitBreakerConfig::default()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let round = pool
            .dispatch(batches(5, 2), Instant::now() + Duration::from_secs(60), &cancel)
            .await;

        assert!(round.results.is_empty());
        assert_eq!(round.unstarted.len(), 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_marks_batch_transient_without_calling() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });
        breaker.try_acquire().unwrap().failure();

        let round = pool(provider.clone(), breaker)
            .dispatch(
                batches(4, 2),
                Instant::now() + Duration::from_secs(60),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(round.results.len(), 2);
        for result in &round.results {
            assert_eq!(result.failure, Some(BatchFailure::CircuitOpen));
            assert!(result.outcomes.iter().all(|(_, o)| o.is_transient()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failures_feed_the_breaker() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            ..Default::default()
        });

        let round = pool(provider.clone(), breaker.clone())
            .with_workers(1)
            .dispatch(
                batches(8, 2),
                Instant::now() + Duration::from_secs(60),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(breaker.state(), resilience::CircuitState::Open);
        assert_eq!(round.results.len(), 4);
        assert!(round.results[2..]
            .iter()
            .all(|r| r.failure == Some(BatchFailure::CircuitOpen)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_timeout_marks_batches_transient() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
        let cold = RateLimiterConfig {
            capacity: 1,
            refill_per_sec: 0.1,
            initial_tokens: 0,
            jitter: Duration::ZERO,
        };
        let settings = DispatchSettings {
            workers: 1,
            acquire_timeout: Duration::from_millis(100),
            ..Default::default()
        };

        let round = pool_with(provider.clone(), cold, breaker.clone(), settings)
            .dispatch(
                batches(5, 2),
                Instant::now() + Duration::from_secs(60),
                &CancellationToken::new(),
            )
            .await;

        assert!(round.unstarted.is_empty());
        assert_eq!(round.results.len(), 3);
        assert_eq!(
            round.results.iter().map(|r| r.outcomes.len()).sum::<usize>(),
            5
        );
        for result in &round.results {
            assert!(matches!(result.failure, Some(BatchFailure::RateLimited(_))));
            assert!(result.outcomes.iter().all(|(_, o)| o.is_transient()));
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.recent_failures(), 0);
        assert_eq!(breaker.state(), resilience::CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout_counts_as_provider_failure() {
        let provider = Arc::new(ScriptedProvider {
            latency: Duration::from_secs(5),
            panic_on: None,
        });
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 5,
            ..Default::default()
        });
        let settings = DispatchSettings {
            workers: 1,
            call_timeout: Duration::from_secs(1),
            ..Default::default()
        };

        let round = pool_with(provider, warm_limiter(), breaker.clone(), settings)
            .dispatch(
                batches(6, 2),
                Instant::now() + Duration::from_secs(60),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(round.results.len(), 3);
        for result in &round.results {
            match &result.failure {
                Some(BatchFailure::Provider(reason)) => assert!(reason.contains("timed out")),
                other => panic!("expected provider timeout, got {:?}", other),
            }
            assert!(result.outcomes.iter().all(|(_, o)| o.is_transient()));
        }
        assert_eq!(breaker.recent_failures(), 3);
        assert_eq!(breaker.state(), resilience::CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_panic_fails_only_its_batch() {
        let provider = Arc::new(ScriptedProvider {
            latency: Duration::from_millis(10),
            panic_on: Some(1),
        });
        let settings = DispatchSettings {
            workers: 1,
            ..Default::default()
        };

        let round = pool_with(
            provider,
            warm_limiter(),
            CircuitBreaker::new(CircuitBreakerConfig::default()),
            settings,
        )
        .dispatch(
            batches(6, 2),
            Instant::now() + Duration::from_secs(60),
            &CancellationToken::new(),
        )
        .await;

        assert!(round.unstarted.is_empty());
        assert_eq!(round.results.len(), 3);

        let failed = &round.results[1];
        assert!(matches!(failed.failure, Some(BatchFailure::Provider(_))));
        assert!(failed.outcomes.iter().all(|(_, o)| o.is_transient()));

        for result in [&round.results[0], &round.results[2]] {
            assert_eq!(result.failure, None);
            assert!(result
                .outcomes
                .iter()
                .all(|(_, o)| matches!(o, DeliveryOutcome::Delivered { .. })));
        }
    }
}
