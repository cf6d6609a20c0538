use push_delivery::{Batch, ProviderEntry, ProviderErrorCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// FCM multicast request (legacy HTTP API)
#[derive(Debug, Serialize)]
pub struct FcmMulticastRequest<'a> {
    pub registration_ids: Vec<&'a str>,
    pub notification: FcmNotification<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<&'a BTreeMap<String, String>>,
    pub priority: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_live: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collapse_key: Option<&'a str>,
}

impl<'a> FcmMulticastRequest<'a> {
    pub fn from_batch(batch: &'a Batch) -> Self {
        let payload = batch.payload.as_ref();
        Self {
            registration_ids: batch.registration_ids(),
            notification: FcmNotification {
                title: &payload.title,
                body: &payload.body,
            },
            data: (!payload.data.is_empty()).then_some(&payload.data),
            priority: payload.options.priority.as_str(),
            time_to_live: payload.options.time_to_live.map(|ttl| ttl.as_secs()),
            collapse_key: payload.options.collapse_key.as_deref(),
        }
    }
}

/// FCM Notification Payload
#[derive(Debug, Serialize)]
pub struct FcmNotification<'a> {
    pub title: &'a str,
    pub body: &'a str,
}

/// FCM multicast response
#[derive(Debug, Deserialize)]
pub struct FcmMulticastResponse {
    #[serde(default)]
    pub multicast_id: Option<i64>,
    #[serde(default)]
    pub success: u32,
    #[serde(default)]
    pub failure: u32,
    #[serde(default)]
    pub canonical_ids: u32,
    #[serde(default)]
    pub results: Vec<FcmResult>,
}

/// One entry per registration id, in request order
#[derive(Debug, Deserialize)]
pub struct FcmResult {
    pub message_id: Option<String>,
    /// Canonical replacement for the id that was sent
    pub registration_id: Option<String>,
    pub error: Option<String>,
}

impl FcmResult {
    pub fn into_entry(self) -> ProviderEntry {
        if let Some(error) = self.error {
            return ProviderEntry::Failed {
                code: error_code(&error),
                detail: None,
            };
        }

        match self.registration_id {
            Some(canonical_id) => ProviderEntry::Replaced {
                message_id: self.message_id,
                canonical_id,
            },
            None => ProviderEntry::Accepted {
                message_id: self.message_id,
            },
        }
    }
}

/// Map an FCM per-result error string onto a provider-neutral code
pub fn error_code(error: &str) -> ProviderErrorCode {
    match error {
        "MissingRegistration" | "InvalidRegistration" => ProviderErrorCode::InvalidRegistration,
        "NotRegistered" => ProviderErrorCode::NotRegistered,
        "MismatchSenderId" | "InvalidPackageName" => ProviderErrorCode::MismatchedSender,
        "Unavailable" => ProviderErrorCode::Unavailable,
        "InternalServerError" => ProviderErrorCode::InternalServerError,
        "DeviceMessageRateExceeded" | "TopicsMessageRateExceeded" => ProviderErrorCode::Throttled,
        "MessageTooBig" => ProviderErrorCode::MessageTooBig,
        "InvalidDataKey" | "InvalidTtl" => ProviderErrorCode::InvalidPayload,
        other => ProviderErrorCode::Unknown(other.to_string()),
    }
}
