/// Batch push notification delivery engine
///
/// Sends one notification to a large set of device registrations through a
/// provider that accepts bounded multicast batches:
/// - **Validation**: malformed identifiers are rejected before any network call
/// - **Planning**: order-preserving batches within the provider's limits
/// - **Dispatch**: a bounded worker pool gated by a shared rate limiter and circuit breaker
/// - **Retries**: transient failures are re-batched with exponential backoff
/// - **Reporting**: exactly one final outcome per input recipient
/// - **Reconciliation**: dead and moved identifiers are fed back to the registry
///
/// # Example
///
/// ```rust,no_run
/// use push_delivery::{DeliveryEngine, DeliveryProvider, NotificationPayload, Recipient, SendOptions};
/// use std::sync::Arc;
///
/// async fn notify(provider: Arc<dyn DeliveryProvider>) -> Result<(), push_delivery::DeliveryError> {
///     let engine = DeliveryEngine::builder(provider).build()?;
///
///     let report = engine
///         .send(
///             vec![Recipient::new("cX1a:APA91b-device-token")],
///             NotificationPayload::new("New message", "You have a new message"),
///             SendOptions::default().with_max_retries(2),
///         )
///         .await?;
///
///     println!("delivered {} of {}", report.summary.delivered, report.summary.total);
///     Ok(())
/// }
/// ```
pub mod aggregator;
pub mod classify;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod planner;
pub mod provider;
pub mod report;
pub mod scheduler;
pub mod validator;

pub use aggregator::ResultAggregator;
pub use classify::{classify, classify_response, Classified};
pub use config::EngineConfig;
pub use dispatcher::{BatchFailure, BatchResult, DispatchRound, DispatchSettings, DispatchWorkerPool};
pub use engine::{DeliveryEngine, DeliveryEngineBuilder, SendOptions};
pub use error::{DeliveryError, Result};
pub use lifecycle::{
    ReconcileOutcome, ReconcilePlan, RegistrationLifecycleManager, RegistryError, RegistryUpdater,
    Replacement,
};
pub use model::{
    Admitted, DeliveryOptions, DeliveryOutcome, FinalOutcome, NotificationPayload, Platform,
    Priority, Recipient,
};
pub use planner::{plan, Batch, BatchId};
pub use provider::{
    DeliveryProvider, ProviderEntry, ProviderError, ProviderErrorCode, ProviderResponse,
};
pub use report::{DeliveryReport, DeliverySummary, ReportEntry, ReportStatus};
pub use scheduler::{RetryDecision, RetryScheduler};
pub use validator::{RegistrationValidator, Rejection, RejectionReason, Validated, ValidatorConfig};

// Shared primitives callers need to build or inspect an engine
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, RateLimiter, RateLimiterConfig,
    RetryConfig,
};
pub use tokio_util::sync::CancellationToken;
