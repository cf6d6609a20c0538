//! Recipients, payloads and delivery outcomes.

use crate::error::{DeliveryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Device platform hint carried alongside a registration identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    Web,
}

impl Platform {
    /// Parse a hint case-insensitively; unknown hints yield `None`
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "android" | "fcm" => Some(Platform::Android),
            "ios" | "apns" => Some(Platform::Ios),
            "web" | "webpush" => Some(Platform::Web),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Web => "web",
        }
    }
}

/// Opaque device registration identifier plus optional metadata
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

impl Recipient {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            platform: None,
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// A recipient accepted into a request, tagged with its input position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    pub position: usize,
    pub recipient: Recipient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "high" => Priority::High,
            _ => Priority::Normal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeliveryOptions {
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_live: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapse_key: Option<String>,
}

/// Notification content shared by every batch of one request
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    #[serde(default)]
    pub options: DeliveryOptions,
}

impl NotificationPayload {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_options(mut self, options: DeliveryOptions) -> Self {
        self.options = options;
        self
    }

    /// Size in bytes of the JSON encoding
    pub fn encoded_len(&self) -> usize {
        serde_json::to_vec(self).map(|bytes| bytes.len()).unwrap_or(usize::MAX)
    }

    /// Reject payloads larger than `max_bytes`
    pub fn ensure_fits(&self, max_bytes: usize) -> Result<()> {
        let len = self.encoded_len();
        if len > max_bytes {
            return Err(DeliveryError::validation(format!(
                "payload is {} bytes, provider ceiling is {} bytes",
                len, max_bytes
            )));
        }
        Ok(())
    }
}

/// Result of one delivery attempt for one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered { message_id: Option<String> },
    /// Malformed identifier, or the provider no longer knows it
    InvalidRecipient { reason: String },
    /// The provider issued a canonical replacement identifier
    RecipientMoved { canonical_id: String },
    /// Rate-limited, timed out, 5xx-class or otherwise retryable
    Transient { reason: String },
    /// Payload-level failure; applies to the whole batch
    Fatal { reason: String },
}

impl DeliveryOutcome {
    pub fn is_transient(&self) -> bool {
        matches!(self, DeliveryOutcome::Transient { .. })
    }

    /// The terminal report outcome for this attempt, `None` if it may be retried
    pub fn into_final(self) -> Option<FinalOutcome> {
        match self {
            DeliveryOutcome::Delivered { message_id } => Some(FinalOutcome::Delivered { message_id }),
            DeliveryOutcome::InvalidRecipient { reason } => {
                Some(FinalOutcome::InvalidRecipient { reason })
            }
            DeliveryOutcome::RecipientMoved { canonical_id } => {
                Some(FinalOutcome::RecipientMoved { canonical_id })
            }
            DeliveryOutcome::Fatal { reason } => Some(FinalOutcome::Fatal { reason }),
            DeliveryOutcome::Transient { .. } => None,
        }
    }
}

/// Final outcome of a recipient in a [`DeliveryReport`](crate::DeliveryReport)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FinalOutcome {
    Delivered { message_id: Option<String> },
    InvalidRecipient { reason: String },
    RecipientMoved { canonical_id: String },
    FailedAfterRetries { attempts: u32, last_error: String },
    Fatal { reason: String },
    /// Never attempted, or its retries were abandoned by cancellation or deadline
    Cancelled,
}

impl FinalOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            FinalOutcome::Delivered { .. } => "delivered",
            FinalOutcome::InvalidRecipient { .. } => "invalid_recipient",
            FinalOutcome::RecipientMoved { .. } => "recipient_moved",
            FinalOutcome::FailedAfterRetries { .. } => "failed_after_retries",
            FinalOutcome::Fatal { .. } => "fatal",
            FinalOutcome::Cancelled => "cancelled",
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, FinalOutcome::Delivered { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_parse() {
        assert_eq!(Platform::parse("Android"), Some(Platform::Android));
        assert_eq!(Platform::parse("APNs"), Some(Platform::Ios));
        assert_eq!(Platform::parse(" web "), Some(Platform::Web));
        assert_eq!(Platform::parse("pager"), None);
    }

    #[test]
    fn test_payload_ceiling() {
        let payload = NotificationPayload::new("Hi", "x".repeat(200));
        assert!(payload.ensure_fits(4096).is_ok());

        let err = payload.ensure_fits(64).unwrap_err();
        assert!(matches!(err, DeliveryError::Validation(msg) if msg.contains("64 bytes")));
    }

    #[test]
    fn test_transient_has_no_final_outcome() {
        let transient = DeliveryOutcome::Transient {
            reason: "Unavailable".to_string(),
        };
        assert!(transient.is_transient());
        assert_eq!(transient.into_final(), None);

        let moved = DeliveryOutcome::RecipientMoved {
            canonical_id: "new-token".to_string(),
        };
        assert_eq!(
            moved.into_final(),
            Some(FinalOutcome::RecipientMoved {
                canonical_id: "new-token".to_string()
            })
        );
    }

    #[test]
    fn test_final_outcome_serialization_is_tagged() {
        let json = serde_json::to_value(FinalOutcome::FailedAfterRetries {
            attempts: 4,
            last_error: "timeout".to_string(),
        })
        .unwrap();

        assert_eq!(json["kind"], "failed_after_retries");
        assert_eq!(json["attempts"], 4);
    }
}
