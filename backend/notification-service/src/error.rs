use push_delivery::DeliveryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid notification request: {0}")]
    Decode(String),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Message source error: {0}")]
    Source(#[from] std::io::Error),
}

impl AppError {
    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Decode(_) => "decode",
            AppError::Delivery(DeliveryError::Validation(_)) => "validation",
            AppError::Delivery(DeliveryError::Configuration(_)) => "configuration",
            AppError::Source(_) => "source",
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
