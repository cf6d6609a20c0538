/// FCM Delivery Provider
///
/// Firebase Cloud Messaging adapter for the push delivery engine, speaking the
/// legacy multicast HTTP API:
/// - Server-key authentication
/// - Up to 1000 registration ids per request
/// - Per-result error strings mapped to provider-neutral codes
/// - Canonical registration ids surfaced as replacements

pub mod client;
pub mod errors;
pub mod models;

pub use client::{
    interpret_response, FcmConfig, FcmProvider, FCM_LEGACY_ENDPOINT, FCM_MAX_PAYLOAD_BYTES,
    FCM_MAX_REGISTRATION_IDS,
};
pub use errors::FcmError;
pub use models::error_code;
