use thiserror::Error;

/// Request-level errors. Per-recipient failures never surface here; they are
/// outcomes in the [`DeliveryReport`](crate::DeliveryReport).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    /// The request is malformed and nothing was sent
    #[error("Validation error: {0}")]
    Validation(String),

    /// Engine or planner configured with unusable values
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl DeliveryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        DeliveryError::Validation(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        DeliveryError::Configuration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, DeliveryError>;
