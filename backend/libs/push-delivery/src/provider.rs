/// Push delivery provider capability
///
/// The engine talks to a provider only through [`DeliveryProvider`]. Adapters
/// translate their wire format into [`ProviderResponse`] so that retry and
/// aggregation never see provider-specific shapes.
use crate::planner::Batch;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[async_trait]
pub trait DeliveryProvider: Send + Sync {
    /// Short provider name for logs
    fn name(&self) -> &str;

    /// Largest number of recipients accepted in one call
    fn max_batch_size(&self) -> usize;

    /// Largest encoded payload accepted, in bytes
    fn max_payload_bytes(&self) -> usize;

    /// Send one batch. `Err` means no structured per-recipient response exists.
    async fn deliver(&self, batch: &Batch) -> Result<ProviderResponse, ProviderError>;
}

/// Structured provider answer for one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderResponse {
    /// One entry per recipient, in batch order
    PerRecipient(Vec<ProviderEntry>),
    /// The provider refused the payload itself
    PayloadRejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEntry {
    Accepted {
        message_id: Option<String>,
    },
    /// Accepted, but the identifier has a canonical replacement
    Replaced {
        message_id: Option<String>,
        canonical_id: String,
    },
    Failed {
        code: ProviderErrorCode,
        detail: Option<String>,
    },
}

impl ProviderEntry {
    pub fn accepted(message_id: impl Into<String>) -> Self {
        ProviderEntry::Accepted {
            message_id: Some(message_id.into()),
        }
    }

    pub fn failed(code: ProviderErrorCode) -> Self {
        ProviderEntry::Failed { code, detail: None }
    }
}

/// Provider-neutral per-recipient error codes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    InvalidRegistration,
    NotRegistered,
    MismatchedSender,
    Unavailable,
    InternalServerError,
    Timeout,
    Throttled,
    MessageTooBig,
    InvalidPayload,
    Unknown(String),
}

impl ProviderErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ProviderErrorCode::InvalidRegistration => "InvalidRegistration",
            ProviderErrorCode::NotRegistered => "NotRegistered",
            ProviderErrorCode::MismatchedSender => "MismatchedSender",
            ProviderErrorCode::Unavailable => "Unavailable",
            ProviderErrorCode::InternalServerError => "InternalServerError",
            ProviderErrorCode::Timeout => "Timeout",
            ProviderErrorCode::Throttled => "Throttled",
            ProviderErrorCode::MessageTooBig => "MessageTooBig",
            ProviderErrorCode::InvalidPayload => "InvalidPayload",
            ProviderErrorCode::Unknown(code) => code,
        }
    }
}

/// Network-level failure: the call produced no per-recipient answer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Network(String),

    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("failed to decode provider response: {0}")]
    Decode(String),
}
