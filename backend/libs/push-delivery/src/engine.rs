/// Delivery Engine
///
/// Caller-facing entry point. `send` validates, batches, dispatches in
/// sequenced rounds with retries, aggregates, and reconciles the registry.
/// The rate limiter and circuit breaker belong to the engine and are shared by
/// every concurrent `send`.
use crate::aggregator::ResultAggregator;
use crate::config::EngineConfig;
use crate::dispatcher::{DispatchSettings, DispatchWorkerPool};
use crate::error::{DeliveryError, Result};
use crate::lifecycle::{RegistrationLifecycleManager, RegistryUpdater};
use crate::model::{NotificationPayload, Recipient};
use crate::planner::plan;
use crate::provider::DeliveryProvider;
use crate::report::{DeliveryReport, ReportStatus};
use crate::scheduler::{RetryDecision, RetryScheduler};
use crate::validator::RegistrationValidator;
use resilience::{CircuitBreaker, CircuitState, RateLimiter, RetryConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Roughly 30 years; what an unbounded deadline saturates to
const FAR_FUTURE_SECS: u64 = 86_400 * 365 * 30;

/// Per-call overrides; unset fields fall back to the engine configuration
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub max_retries: Option<u32>,
    pub worker_count: Option<usize>,
    /// Time budget for the whole call, measured from its start
    pub deadline: Option<Duration>,
    pub cancel: Option<CancellationToken>,
    pub request_id: Option<Uuid>,
}

impl SendOptions {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = Some(worker_count);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }
}

pub struct DeliveryEngineBuilder {
    provider: Arc<dyn DeliveryProvider>,
    config: EngineConfig,
    rate_limiter: Option<Arc<RateLimiter>>,
    circuit_breaker: Option<CircuitBreaker>,
    registry: Option<Arc<dyn RegistryUpdater>>,
}

impl DeliveryEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing limiter instead of building one from the config
    pub fn rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    /// Share an existing breaker instead of building one from the config
    pub fn circuit_breaker(mut self, circuit_breaker: CircuitBreaker) -> Self {
        self.circuit_breaker = Some(circuit_breaker);
        self
    }

    pub fn registry(mut self, registry: Arc<dyn RegistryUpdater>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Result<DeliveryEngine> {
        self.config.validate()?;

        let max_batch_size = self.config.max_batch_size.min(self.provider.max_batch_size());
        let max_payload_bytes = self
            .config
            .max_payload_bytes
            .min(self.provider.max_payload_bytes());
        if max_batch_size == 0 || max_payload_bytes == 0 {
            return Err(DeliveryError::configuration(format!(
                "provider {} declares a zero batch or payload limit",
                self.provider.name()
            )));
        }

        let limiter = self
            .rate_limiter
            .unwrap_or_else(|| Arc::new(RateLimiter::new(self.config.rate_limit.clone())));
        let breaker = self
            .circuit_breaker
            .unwrap_or_else(|| CircuitBreaker::new(self.config.circuit_breaker.clone()));

        let pool = DispatchWorkerPool::new(
            self.provider.clone(),
            limiter.clone(),
            breaker.clone(),
            DispatchSettings {
                workers: self.config.worker_count,
                call_timeout: self.config.call_timeout,
                acquire_timeout: self.config.acquire_timeout,
            },
        );

        let lifecycle = self
            .registry
            .map(|updater| RegistrationLifecycleManager::new(updater, self.config.registry_timeout));

        info!(
            provider = self.provider.name(),
            max_batch_size,
            max_payload_bytes,
            workers = self.config.worker_count,
            "delivery engine ready"
        );

        Ok(DeliveryEngine {
            provider: self.provider,
            validator: RegistrationValidator::new(self.config.validator.clone()),
            config: self.config,
            pool,
            limiter,
            breaker,
            lifecycle,
            max_batch_size,
            max_payload_bytes,
        })
    }
}

pub struct DeliveryEngine {
    provider: Arc<dyn DeliveryProvider>,
    config: EngineConfig,
    validator: RegistrationValidator,
    pool: DispatchWorkerPool,
    limiter: Arc<RateLimiter>,
    breaker: CircuitBreaker,
    lifecycle: Option<RegistrationLifecycleManager>,
    max_batch_size: usize,
    max_payload_bytes: usize,
}

impl DeliveryEngine {
    pub fn builder(provider: Arc<dyn DeliveryProvider>) -> DeliveryEngineBuilder {
        DeliveryEngineBuilder {
            provider,
            config: EngineConfig::default(),
            rate_limiter: None,
            circuit_breaker: None,
            registry: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Operator override: close the breaker and forget recorded failures
    pub fn reset_circuit(&self) {
        warn!(provider = self.provider.name(), "circuit breaker reset by operator");
        self.breaker.reset();
    }

    /// Deliver `payload` to every recipient.
    ///
    /// Fails only for request-level problems found before any network I/O.
    /// Otherwise the report holds exactly one final outcome per input
    /// recipient, in input order.
    pub async fn send(
        &self,
        recipients: Vec<Recipient>,
        payload: NotificationPayload,
        options: SendOptions,
    ) -> Result<DeliveryReport> {
        if recipients.is_empty() {
            return Err(DeliveryError::validation("recipient list is empty"));
        }
        payload.ensure_fits(self.max_payload_bytes)?;

        let worker_count = options.worker_count.unwrap_or(self.config.worker_count);
        if worker_count == 0 {
            return Err(DeliveryError::validation("worker_count must be positive"));
        }

        let request_id = options.request_id.unwrap_or_else(Uuid::new_v4);
        let deadline = deadline_after(options.deadline.unwrap_or(self.config.default_deadline));
        let cancel = options.cancel.unwrap_or_default();
        let scheduler = RetryScheduler::new(
            RetryConfig {
                max_retries: options.max_retries.unwrap_or(self.config.retry.max_retries),
                ..self.config.retry.clone()
            },
            self.max_batch_size,
        );
        let pool = self.pool.with_workers(worker_count);

        info!(
            %request_id,
            recipients = recipients.len(),
            provider = self.provider.name(),
            "send started"
        );

        let mut aggregator = ResultAggregator::new(request_id, &recipients);
        let validated = self.validator.validate(recipients);
        if !validated.rejected.is_empty() {
            debug!(
                %request_id,
                rejected = validated.rejected.len(),
                "recipients rejected before dispatch"
            );
        }
        aggregator.record_rejections(validated.rejected);

        let payload = Arc::new(payload);
        let mut batches = plan(validated.valid, payload.clone(), self.max_batch_size, 0)?;
        let mut retries_done = 0;

        let status = loop {
            let round = pool.dispatch(batches, deadline, &cancel).await;

            let mut transient = Vec::new();
            for result in round.results {
                transient.extend(aggregator.merge(result));
            }

            if !round.unstarted.is_empty() {
                break interrupted(&cancel);
            }

            match scheduler.schedule(transient, &payload, retries_done)? {
                RetryDecision::Idle => break ReportStatus::Completed,
                RetryDecision::Exhausted(left) => {
                    warn!(
                        %request_id,
                        recipients = left.len(),
                        retries = retries_done,
                        "retries exhausted"
                    );
                    aggregator.record_exhausted(left);
                    break ReportStatus::Completed;
                }
                RetryDecision::Retry {
                    round,
                    batches: next,
                    delay,
                } => {
                    if cancel.is_cancelled() {
                        break ReportStatus::Cancelled;
                    }
                    if deadline_after(delay) >= deadline {
                        break ReportStatus::DeadlineExceeded;
                    }

                    info!(
                        %request_id,
                        round,
                        batches = next.len(),
                        delay_ms = delay.as_millis() as u64,
                        "scheduling retry round"
                    );

                    let cancelled = tokio::select! {
                        _ = cancel.cancelled() => true,
                        _ = sleep(delay) => false,
                    };
                    if cancelled {
                        break ReportStatus::Cancelled;
                    }

                    retries_done += 1;
                    batches = next;
                }
            }
        };

        let mut report = aggregator.finish(status);

        if let Some(lifecycle) = &self.lifecycle {
            let plan = RegistrationLifecycleManager::reconcile(&report);
            if !plan.is_empty() {
                report.reconciliation = Some(lifecycle.apply(plan).await);
            }
        }

        info!(
            %request_id,
            status = report.status.as_str(),
            delivered = report.summary.delivered,
            invalid = report.summary.invalid,
            moved = report.summary.moved,
            failed = report.summary.failed_after_retries,
            fatal = report.summary.fatal,
            cancelled = report.summary.cancelled,
            retry_rounds = report.retry_rounds,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "send finished"
        );

        Ok(report)
    }
}

/// `budget` from now, saturating at a far-future instant
pub(crate) fn deadline_after(budget: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(budget)
        .unwrap_or_else(|| now + Duration::from_secs(FAR_FUTURE_SECS))
}

/// Status for a call that stopped with work outstanding
fn interrupted(cancel: &CancellationToken) -> ReportStatus {
    if cancel.is_cancelled() {
        ReportStatus::Cancelled
    } else {
        ReportStatus::DeadlineExceeded
    }
}
