/// Registration Validator
///
/// Syntactic checks on registration identifiers before any network call.
/// Rejected identifiers go straight into the report as `InvalidRecipient`.
use crate::model::{Admitted, Recipient};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    pub min_len: usize,
    pub max_len: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_len: 8,
            max_len: 4096,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    Empty,
    TooShort { len: usize, min: usize },
    TooLong { len: usize, max: usize },
    InvalidCharacter { ch: char, index: usize },
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::Empty => write!(f, "identifier is empty"),
            RejectionReason::TooShort { len, min } => {
                write!(f, "identifier length {} is below minimum {}", len, min)
            }
            RejectionReason::TooLong { len, max } => {
                write!(f, "identifier length {} exceeds maximum {}", len, max)
            }
            RejectionReason::InvalidCharacter { ch, index } => {
                write!(f, "invalid character {:?} at index {}", ch, index)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub position: usize,
    pub recipient: Recipient,
    pub reason: RejectionReason,
}

#[derive(Debug, Default)]
pub struct Validated {
    pub valid: Vec<Admitted>,
    pub rejected: Vec<Rejection>,
}

#[derive(Debug, Clone, Default)]
pub struct RegistrationValidator {
    config: ValidatorConfig,
}

impl RegistrationValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Split recipients into admitted and rejected, keeping input positions
    pub fn validate(&self, recipients: Vec<Recipient>) -> Validated {
        let mut validated = Validated::default();

        for (position, recipient) in recipients.into_iter().enumerate() {
            match self.check(&recipient.id) {
                Ok(()) => validated.valid.push(Admitted {
                    position,
                    recipient,
                }),
                Err(reason) => validated.rejected.push(Rejection {
                    position,
                    recipient,
                    reason,
                }),
            }
        }

        validated
    }

    pub fn check(&self, id: &str) -> Result<(), RejectionReason> {
        if id.is_empty() {
            return Err(RejectionReason::Empty);
        }

        if let Some((index, ch)) = id.char_indices().find(|(_, ch)| !is_allowed(*ch)) {
            return Err(RejectionReason::InvalidCharacter { ch, index });
        }

        // Allowed characters are ASCII, so byte length equals char count here
        let len = id.len();
        if len < self.config.min_len {
            return Err(RejectionReason::TooShort {
                len,
                min: self.config.min_len,
            });
        }
        if len > self.config.max_len {
            return Err(RejectionReason::TooLong {
                len,
                max: self.config.max_len,
            });
        }

        Ok(())
    }
}

fn is_allowed(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | ':' | '.' | '-')
}
