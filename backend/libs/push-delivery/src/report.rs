use crate::lifecycle::ReconcileOutcome;
use crate::model::{FinalOutcome, Recipient};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// How a `send` call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Every recipient reached a terminal outcome
    Completed,
    /// The caller cancelled; unfinished recipients are `Cancelled`
    Cancelled,
    /// The request deadline passed; unfinished recipients are `Cancelled`
    DeadlineExceeded,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Completed => "completed",
            ReportStatus::Cancelled => "cancelled",
            ReportStatus::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Index of the recipient in the request
    pub position: usize,
    pub recipient: Recipient,
    pub outcome: FinalOutcome,
    /// Provider calls that included this recipient
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverySummary {
    pub total: usize,
    pub delivered: usize,
    pub invalid: usize,
    pub moved: usize,
    pub failed_after_retries: usize,
    pub fatal: usize,
    pub cancelled: usize,
}

impl DeliverySummary {
    pub fn from_entries(entries: &[ReportEntry]) -> Self {
        let mut summary = DeliverySummary {
            total: entries.len(),
            ..Default::default()
        };

        for entry in entries {
            match entry.outcome {
                FinalOutcome::Delivered { .. } => summary.delivered += 1,
                FinalOutcome::InvalidRecipient { .. } => summary.invalid += 1,
                FinalOutcome::RecipientMoved { .. } => summary.moved += 1,
                FinalOutcome::FailedAfterRetries { .. } => summary.failed_after_retries += 1,
                FinalOutcome::Fatal { .. } => summary.fatal += 1,
                FinalOutcome::Cancelled => summary.cancelled += 1,
            }
        }

        summary
    }
}

/// Outcome of one `send` call: one entry per input recipient, in input order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub request_id: Uuid,
    pub status: ReportStatus,
    pub entries: Vec<ReportEntry>,
    pub summary: DeliverySummary,
    /// Recipient deliveries re-attempted in retry rounds
    pub retry_attempts: u32,
    /// Retry rounds dispatched after the first pass
    pub retry_rounds: u32,
    /// From call start to the last batch completion
    pub elapsed: Duration,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciliation: Option<ReconcileOutcome>,
}

impl DeliveryReport {
    /// Final outcome of the first entry addressed to `recipient_id`
    pub fn outcome_for(&self, recipient_id: &str) -> Option<&FinalOutcome> {
        self.entries
            .iter()
            .find(|entry| entry.recipient.id == recipient_id)
            .map(|entry| &entry.outcome)
    }

    pub fn entries_labelled<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a ReportEntry> {
        self.entries
            .iter()
            .filter(move |entry| entry.outcome.label() == label)
    }

    pub fn is_complete(&self) -> bool {
        self.status == ReportStatus::Completed
    }
}
