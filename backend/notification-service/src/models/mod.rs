use crate::error::{AppError, Result};
use push_delivery::{
    DeliveryOptions, DeliveryReport, NotificationPayload, Platform, Priority, Recipient,
    SendOptions,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// One fan-out request as read from the message source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEnvelope {
    #[serde(default)]
    pub request_id: Option<Uuid>,
    pub recipients: Vec<RecipientRecord>,
    pub notification: NotificationRecord,
    #[serde(default)]
    pub options: Option<EnvelopeOptions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientRecord {
    pub token: String,
    /// Free-form hint; unknown values are dropped
    #[serde(default)]
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
    #[serde(default)]
    pub collapse_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvelopeOptions {
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub worker_count: Option<usize>,
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

impl SendEnvelope {
    pub fn decode(line: &str) -> Result<Self> {
        let envelope: SendEnvelope = serde_json::from_str(line)?;
        if envelope.recipients.is_empty() {
            return Err(AppError::Decode("recipients must not be empty".to_string()));
        }
        Ok(envelope)
    }

    /// Split into engine inputs, preserving recipient order
    pub fn into_parts(self) -> (Vec<Recipient>, NotificationPayload, SendOptions) {
        let recipients = self
            .recipients
            .into_iter()
            .map(|record| {
                let recipient = Recipient::new(record.token);
                match record.platform.as_deref().and_then(Platform::parse) {
                    Some(platform) => recipient.with_platform(platform),
                    None => recipient,
                }
            })
            .collect();

        let notification = self.notification;
        let payload = NotificationPayload {
            title: notification.title,
            body: notification.body,
            data: notification.data,
            options: DeliveryOptions {
                priority: notification
                    .priority
                    .as_deref()
                    .map(Priority::parse)
                    .unwrap_or_default(),
                time_to_live: notification.ttl_secs.map(Duration::from_secs),
                collapse_key: notification.collapse_key,
            },
        };

        let mut options = SendOptions::default();
        if let Some(request_id) = self.request_id {
            options = options.with_request_id(request_id);
        }
        if let Some(envelope_options) = self.options {
            if let Some(max_retries) = envelope_options.max_retries {
                options = options.with_max_retries(max_retries);
            }
            if let Some(worker_count) = envelope_options.worker_count {
                options = options.with_worker_count(worker_count);
            }
            if let Some(deadline_ms) = envelope_options.deadline_ms {
                options = options.with_deadline(Duration::from_millis(deadline_ms));
            }
        }

        (recipients, payload, options)
    }
}

/// Report line written for every processed envelope
#[derive(Debug, Clone, Serialize)]
pub struct ReportRecord<'a> {
    pub request_id: Uuid,
    pub status: &'static str,
    pub total: usize,
    pub delivered: usize,
    pub report: &'a DeliveryReport,
}

impl<'a> From<&'a DeliveryReport> for ReportRecord<'a> {
    fn from(report: &'a DeliveryReport) -> Self {
        Self {
            request_id: report.request_id,
            status: report.status.as_str(),
            total: report.summary.total,
            delivered: report.summary.delivered,
            report,
        }
    }
}
