/// Result Aggregator
///
/// Collects outcomes from every dispatch round into one slot per input
/// recipient. A slot is written once; the first terminal outcome wins.
use crate::dispatcher::{BatchFailure, BatchResult};
use crate::model::{Admitted, DeliveryOutcome, FinalOutcome, Recipient};
use crate::report::{DeliveryReport, DeliverySummary, ReportEntry, ReportStatus};
use crate::validator::Rejection;
use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

struct Slot {
    recipient: Recipient,
    outcome: Option<FinalOutcome>,
    attempts: u32,
    last_error: Option<String>,
}

pub struct ResultAggregator {
    request_id: Uuid,
    slots: Vec<Slot>,
    started: Instant,
    started_at: DateTime<Utc>,
    last_completion: Option<Instant>,
    retry_attempts: u32,
    retry_rounds: u32,
}

impl ResultAggregator {
    pub fn new(request_id: Uuid, recipients: &[Recipient]) -> Self {
        Self {
            request_id,
            slots: recipients
                .iter()
                .map(|recipient| Slot {
                    recipient: recipient.clone(),
                    outcome: None,
                    attempts: 0,
                    last_error: None,
                })
                .collect(),
            started: Instant::now(),
            started_at: Utc::now(),
            last_completion: None,
            retry_attempts: 0,
            retry_rounds: 0,
        }
    }

    pub fn record_rejections(&mut self, rejected: Vec<Rejection>) {
        for rejection in rejected {
            self.settle(
                rejection.position,
                FinalOutcome::InvalidRecipient {
                    reason: rejection.reason.to_string(),
                },
            );
        }
    }

    /// Record one batch. Returns the recipients that came back `Transient`.
    ///
    /// Batches turned away by the circuit breaker or the rate limiter never
    /// reached the provider and do not count as attempts.
    pub fn merge(&mut self, result: BatchResult) -> Vec<Admitted> {
        let round = result.batch_id.round;
        let reached_provider = !matches!(
            result.failure,
            Some(BatchFailure::CircuitOpen | BatchFailure::RateLimited(_))
        );
        if round > 0 {
            self.retry_rounds = self.retry_rounds.max(round);
            if reached_provider {
                self.retry_attempts += result.outcomes.len() as u32;
            }
        }
        self.last_completion = Some(match self.last_completion {
            Some(last) => last.max(result.completed_at),
            None => result.completed_at,
        });

        let mut transient = Vec::new();
        for (admitted, outcome) in result.outcomes {
            let Some(slot) = self.slots.get_mut(admitted.position) else {
                warn!(
                    position = admitted.position,
                    "outcome for unknown recipient position, ignoring"
                );
                continue;
            };
            if reached_provider {
                slot.attempts += 1;
            }

            match outcome {
                DeliveryOutcome::Transient { reason } => {
                    slot.last_error = Some(reason);
                    transient.push(admitted);
                }
                terminal => {
                    if let Some(outcome) = terminal.into_final() {
                        self.settle(admitted.position, outcome);
                    }
                }
            }
        }

        transient
    }

    /// Retry budget spent for `exhausted`; they fail with their last error
    pub fn record_exhausted(&mut self, exhausted: Vec<Admitted>) {
        for admitted in exhausted {
            let Some(slot) = self.slots.get(admitted.position) else {
                continue;
            };
            let outcome = FinalOutcome::FailedAfterRetries {
                attempts: slot.attempts,
                last_error: slot
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "transient failure".to_string()),
            };
            self.settle(admitted.position, outcome);
        }
    }

    /// Build the report. Slots without a terminal outcome become `Cancelled`.
    pub fn finish(self, status: ReportStatus) -> DeliveryReport {
        let elapsed = self.last_completion.unwrap_or_else(Instant::now) - self.started;

        let entries: Vec<ReportEntry> = self
            .slots
            .into_iter()
            .enumerate()
            .map(|(position, slot)| ReportEntry {
                position,
                recipient: slot.recipient,
                outcome: slot.outcome.unwrap_or(FinalOutcome::Cancelled),
                attempts: slot.attempts,
            })
            .collect();

        DeliveryReport {
            request_id: self.request_id,
            status,
            summary: DeliverySummary::from_entries(&entries),
            entries,
            retry_attempts: self.retry_attempts,
            retry_rounds: self.retry_rounds,
            elapsed,
            started_at: self.started_at,
            reconciliation: None,
        }
    }

    fn settle(&mut self, position: usize, outcome: FinalOutcome) {
        let Some(slot) = self.slots.get_mut(position) else {
            warn!(position, "outcome for unknown recipient position, ignoring");
            return;
        };

        match &slot.outcome {
            Some(existing) => warn!(
                position,
                existing = existing.label(),
                ignored = outcome.label(),
                "recipient already has a final outcome"
            ),
            None => slot.outcome = Some(outcome),
        }
    }
}
