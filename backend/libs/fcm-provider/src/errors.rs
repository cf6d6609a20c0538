use thiserror::Error;

/// FCM Client Error Types
#[derive(Error, Debug)]
pub enum FcmError {
    #[error("FCM server key is missing")]
    MissingServerKey,

    #[error("Invalid FCM endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}
