use crate::errors::FcmError;
use crate::models::{FcmMulticastRequest, FcmMulticastResponse, FcmResult};
use async_trait::async_trait;
use push_delivery::{Batch, DeliveryProvider, ProviderError, ProviderResponse};
use std::time::Duration;
use tracing::{debug, warn};

pub const FCM_LEGACY_ENDPOINT: &str = "https://fcm.googleapis.com/fcm/send";

/// Registration ids accepted in one multicast request
pub const FCM_MAX_REGISTRATION_IDS: usize = 1000;

/// Largest notification payload FCM accepts
pub const FCM_MAX_PAYLOAD_BYTES: usize = 4096;

const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct FcmConfig {
    pub server_key: String,
    pub endpoint: String,
    pub request_timeout: Duration,
}

impl FcmConfig {
    pub fn new(server_key: impl Into<String>) -> Self {
        Self {
            server_key: server_key.into(),
            endpoint: FCM_LEGACY_ENDPOINT.to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Firebase Cloud Messaging delivery provider
///
/// Sends one batch per multicast request, authenticated with the project's
/// server key. Each result in FCM's response lines up with the registration
/// id at the same index.
pub struct FcmProvider {
    config: FcmConfig,
    http_client: reqwest::Client,
}

impl FcmProvider {
    pub fn new(config: FcmConfig) -> Result<Self, FcmError> {
        if config.server_key.trim().is_empty() {
            return Err(FcmError::MissingServerKey);
        }
        reqwest::Url::parse(&config.endpoint)
            .map_err(|e| FcmError::InvalidEndpoint(format!("{}: {}", config.endpoint, e)))?;

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FcmError::ClientBuild(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

#[async_trait]
impl DeliveryProvider for FcmProvider {
    fn name(&self) -> &str {
        "fcm"
    }

    fn max_batch_size(&self) -> usize {
        FCM_MAX_REGISTRATION_IDS
    }

    fn max_payload_bytes(&self) -> usize {
        FCM_MAX_PAYLOAD_BYTES
    }

    async fn deliver(&self, batch: &Batch) -> Result<ProviderResponse, ProviderError> {
        let request = FcmMulticastRequest::from_batch(batch);

        let response = self
            .http_client
            .post(&self.config.endpoint)
            .header("Authorization", format!("key={}", self.config.server_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.config.request_timeout)
                } else {
                    ProviderError::Network(format!("FCM send request failed: {}", e))
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(format!("Failed to read FCM response: {}", e)))?;

        debug!(
            batch = %batch.id,
            recipients = batch.len(),
            status,
            "FCM multicast answered"
        );

        interpret_response(status, &body, batch.len())
    }
}

/// Turn an FCM HTTP answer into a provider-neutral response
pub fn interpret_response(
    status: u16,
    body: &str,
    expected: usize,
) -> Result<ProviderResponse, ProviderError> {
    match status {
        200 => {
            let parsed: FcmMulticastResponse = serde_json::from_str(body)
                .map_err(|e| ProviderError::Decode(format!("Failed to parse FCM response: {}", e)))?;

            if parsed.results.len() != expected {
                return Err(ProviderError::Decode(format!(
                    "FCM returned {} results for {} registration ids",
                    parsed.results.len(),
                    expected
                )));
            }

            if parsed.canonical_ids > 0 || parsed.failure > 0 {
                debug!(
                    success = parsed.success,
                    failure = parsed.failure,
                    canonical_ids = parsed.canonical_ids,
                    "FCM multicast had per-recipient issues"
                );
            }

            Ok(ProviderResponse::PerRecipient(
                parsed.results.into_iter().map(FcmResult::into_entry).collect(),
            ))
        }
        400 => Ok(ProviderResponse::PayloadRejected {
            reason: format!("FCM rejected the request: {}", truncate(body.trim())),
        }),
        401 | 403 => {
            warn!(status, "FCM rejected the server key");
            Ok(ProviderResponse::PayloadRejected {
                reason: format!("FCM authentication failed (HTTP {})", status),
            })
        }
        _ => Err(ProviderError::Http {
            status,
            body: truncate(body.trim()).to_string(),
        }),
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((index, _)) => &body[..index],
        None => body,
    }
}
