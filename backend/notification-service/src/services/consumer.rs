/// Notification request consumer
///
/// Reads newline-delimited JSON send requests from a [`MessageSource`], runs
/// each through the delivery engine and hands the finished report to a
/// [`ReportSink`]. Requests are processed one at a time; shutdown cancels the
/// request in flight, whose partial report is still emitted.
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{ReportRecord, SendEnvelope};
use async_trait::async_trait;
use push_delivery::{CancellationToken, DeliveryEngine, DeliveryReport};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing::{debug, info, warn};

#[async_trait]
pub trait MessageSource: Send {
    /// Next raw message, `None` once the source is exhausted
    async fn next_message(&mut self) -> Result<Option<String>>;
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn emit(&self, report: &DeliveryReport) -> Result<()>;
}

/// Reads one envelope per line from standard input
pub struct StdinSource {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinSource {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageSource for StdinSource {
    async fn next_message(&mut self) -> Result<Option<String>> {
        Ok(self.lines.next_line().await?)
    }
}

/// Writes one JSON report per line to standard output
#[derive(Default)]
pub struct StdoutSink;

#[async_trait]
impl ReportSink for StdoutSink {
    async fn emit(&self, report: &DeliveryReport) -> Result<()> {
        let mut line = serde_json::to_vec(&ReportRecord::from(report))?;
        line.push(b'\n');

        let mut stdout = tokio::io::stdout();
        stdout.write_all(&line).await?;
        stdout.flush().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub processed: u64,
    pub rejected: u64,
}

pub struct NotificationConsumer {
    engine: Arc<DeliveryEngine>,
    sink: Arc<dyn ReportSink>,
}

impl NotificationConsumer {
    pub fn new(engine: Arc<DeliveryEngine>, sink: Arc<dyn ReportSink>) -> Self {
        Self { engine, sink }
    }

    /// Consume until the source is exhausted or `shutdown` fires
    pub async fn run(
        &self,
        source: &mut dyn MessageSource,
        shutdown: CancellationToken,
    ) -> Result<ConsumerStats> {
        let mut stats = ConsumerStats::default();

        loop {
            let message = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, consumer stopping");
                    break;
                }
                message = source.next_message() => message?,
            };

            let Some(line) = message else {
                info!("Message source exhausted");
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            match self.handle(&line, &shutdown).await {
                Ok(()) => stats.processed += 1,
                Err(AppError::Source(e)) => return Err(AppError::Source(e)),
                Err(e) => {
                    warn!(error = %e, kind = e.kind(), "Dropping notification request");
                    metrics::observe_rejected(e.kind());
                    stats.rejected += 1;
                }
            }
        }

        info!(
            processed = stats.processed,
            rejected = stats.rejected,
            "Consumer finished"
        );
        Ok(stats)
    }

    async fn handle(&self, line: &str, shutdown: &CancellationToken) -> Result<()> {
        let envelope = SendEnvelope::decode(line)?;
        let (recipients, payload, options) = envelope.into_parts();
        debug!(recipients = recipients.len(), "Decoded send request");

        let report = self
            .engine
            .send(recipients, payload, options.with_cancel(shutdown.child_token()))
            .await?;

        metrics::observe_report(&report);
        self.sink.emit(&report).await
    }
}
