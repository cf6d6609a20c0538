/// Consumer tests for notification-service
///
/// This test module covers:
/// - Decoding and dispatching newline-delimited send requests
/// - Rejection of malformed and invalid requests without stopping the loop
/// - Dead tokens surfacing in emitted reports
/// - Shutdown of an idle consumer and source failures
use async_trait::async_trait;
use notification_service::{
    AppError, MessageSource, NotificationConsumer, ReportSink, Result,
};
use push_delivery::{
    Batch, CancellationToken, DeliveryEngine, DeliveryProvider, DeliveryReport, EngineConfig,
    FinalOutcome, ProviderEntry, ProviderError, ProviderErrorCode, ProviderResponse,
    RateLimiterConfig, ReportStatus, RetryConfig,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Accepts every token except those prefixed `dead-`
struct StubProvider;

#[async_trait]
impl DeliveryProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    fn max_batch_size(&self) -> usize {
        2
    }

    fn max_payload_bytes(&self) -> usize {
        4096
    }

    async fn deliver(&self, batch: &Batch) -> std::result::Result<ProviderResponse, ProviderError> {
        let entries = batch
            .entries
            .iter()
            .map(|admitted| {
                if admitted.recipient.id.starts_with("dead-") {
                    ProviderEntry::failed(ProviderErrorCode::NotRegistered)
                } else {
                    ProviderEntry::accepted(format!("msg-{}", admitted.recipient.id))
                }
            })
            .collect();
        Ok(ProviderResponse::PerRecipient(entries))
    }
}

struct VecSource {
    lines: VecDeque<String>,
}

impl VecSource {
    fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }
}

#[async_trait]
impl MessageSource for VecSource {
    async fn next_message(&mut self) -> Result<Option<String>> {
        Ok(self.lines.pop_front())
    }
}

/// Never yields a message
struct IdleSource;

#[async_trait]
impl MessageSource for IdleSource {
    async fn next_message(&mut self) -> Result<Option<String>> {
        std::future::pending().await
    }
}

struct BrokenSource;

#[async_trait]
impl MessageSource for BrokenSource {
    async fn next_message(&mut self) -> Result<Option<String>> {
        Err(AppError::Source(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "pipe closed",
        )))
    }
}

#[derive(Default)]
struct MemorySink {
    reports: Mutex<Vec<DeliveryReport>>,
}

#[async_trait]
impl ReportSink for MemorySink {
    async fn emit(&self, report: &DeliveryReport) -> Result<()> {
        self.reports.lock().await.push(report.clone());
        Ok(())
    }
}

fn consumer(sink: Arc<MemorySink>) -> NotificationConsumer {
    let config = EngineConfig {
        retry: RetryConfig {
            max_retries: 1,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            jitter_window: Duration::ZERO,
        },
        rate_limit: RateLimiterConfig {
            capacity: 100,
            refill_per_sec: 1000.0,
            initial_tokens: 100,
            jitter: Duration::ZERO,
        },
        ..EngineConfig::default()
    };
    let engine = DeliveryEngine::builder(Arc::new(StubProvider))
        .config(config)
        .build()
        .unwrap();
    NotificationConsumer::new(Arc::new(engine), sink)
}

const GOOD: &str = r#"{"recipients":[{"token":"device-token-a"},{"token":"device-token-b"},{"token":"device-token-c"}],"notification":{"title":"Hi","body":"there"}}"#;
const WITH_DEAD: &str = r#"{"recipients":[{"token":"device-token-a"},{"token":"dead-token-b"}],"notification":{"title":"Hi","body":"there"}}"#;

#[tokio::test]
async fn test_processes_valid_requests_and_rejects_bad_ones() {
    let sink = Arc::new(MemorySink::default());
    let consumer = consumer(sink.clone());

    let oversized = format!(
        r#"{{"recipients":[{{"token":"device-token-a"}}],"notification":{{"title":"Hi","body":"{}"}}}}"#,
        "x".repeat(5000)
    );
    let mut source = VecSource::new(&[
        GOOD,
        "",
        "{not json",
        r#"{"recipients":[],"notification":{"title":"a","body":"b"}}"#,
        &oversized,
        WITH_DEAD,
    ]);

    let stats = consumer
        .run(&mut source, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.processed, 2);
    assert_eq!(stats.rejected, 3);

    let reports = sink.reports.lock().await;
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].status, ReportStatus::Completed);
    assert_eq!(reports[0].summary.total, 3);
    assert_eq!(reports[0].summary.delivered, 3);
}

#[tokio::test]
async fn test_dead_tokens_are_reported_invalid() {
    let sink = Arc::new(MemorySink::default());
    let consumer = consumer(sink.clone());

    let mut source = VecSource::new(&[WITH_DEAD]);
    consumer
        .run(&mut source, CancellationToken::new())
        .await
        .unwrap();

    let reports = sink.reports.lock().await;
    let report = &reports[0];
    assert!(report.is_complete());
    assert!(report.outcome_for("device-token-a").map(FinalOutcome::is_delivered).unwrap_or(false));
    assert!(matches!(
        report.outcome_for("dead-token-b"),
        Some(FinalOutcome::InvalidRecipient { .. })
    ));
}

#[tokio::test]
async fn test_shutdown_stops_idle_consumer() {
    let sink = Arc::new(MemorySink::default());
    let consumer = consumer(sink.clone());

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let stats = tokio::time::timeout(
        Duration::from_secs(5),
        consumer.run(&mut IdleSource, shutdown),
    )
    .await
    .expect("consumer did not stop on shutdown")
    .unwrap();

    assert_eq!(stats.processed, 0);
    assert!(sink.reports.lock().await.is_empty());
}

#[tokio::test]
async fn test_source_errors_end_the_run() {
    let sink = Arc::new(MemorySink::default());
    let consumer = consumer(sink);

    let err = consumer
        .run(&mut BrokenSource, CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "source");
}
