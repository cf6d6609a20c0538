/// Classification of provider answers into delivery outcomes
///
/// | Provider answer                                      | Outcome            |
/// |------------------------------------------------------|--------------------|
/// | accepted                                             | `Delivered`        |
/// | replaced (canonical id returned)                     | `RecipientMoved`   |
/// | invalid registration / not registered / wrong sender | `InvalidRecipient` |
/// | unavailable / 5xx / timeout / throttled / unknown    | `Transient`        |
/// | message too big / invalid payload / payload rejected | `Fatal` (batch)    |
/// | network error or unstructured response               | `Transient` (batch)|
use crate::model::DeliveryOutcome;
use crate::planner::Batch;
use crate::provider::{ProviderEntry, ProviderError, ProviderErrorCode, ProviderResponse};

/// Outcomes for every recipient of a batch, plus whether the call counts as a
/// provider failure for the circuit breaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub outcomes: Vec<DeliveryOutcome>,
    pub provider_failure: bool,
}

/// Map one per-recipient entry
pub fn classify(entry: &ProviderEntry) -> DeliveryOutcome {
    match entry {
        ProviderEntry::Accepted { message_id } => DeliveryOutcome::Delivered {
            message_id: message_id.clone(),
        },
        ProviderEntry::Replaced { canonical_id, .. } => DeliveryOutcome::RecipientMoved {
            canonical_id: canonical_id.clone(),
        },
        ProviderEntry::Failed { code, detail } => {
            let reason = match detail {
                Some(detail) => format!("{}: {}", code.as_str(), detail),
                None => code.as_str().to_string(),
            };
            match code {
                ProviderErrorCode::InvalidRegistration
                | ProviderErrorCode::NotRegistered
                | ProviderErrorCode::MismatchedSender => DeliveryOutcome::InvalidRecipient { reason },
                ProviderErrorCode::Unavailable
                | ProviderErrorCode::InternalServerError
                | ProviderErrorCode::Timeout
                | ProviderErrorCode::Throttled
                | ProviderErrorCode::Unknown(_) => DeliveryOutcome::Transient { reason },
                ProviderErrorCode::MessageTooBig | ProviderErrorCode::InvalidPayload => {
                    DeliveryOutcome::Fatal { reason }
                }
            }
        }
    }
}

/// Map a whole provider call for `batch`
pub fn classify_response(
    batch: &Batch,
    response: Result<ProviderResponse, ProviderError>,
) -> Classified {
    let entries = match response {
        Err(err) => return all_transient(batch, err.to_string()),
        Ok(ProviderResponse::PayloadRejected { reason }) => {
            return Classified {
                outcomes: vec![DeliveryOutcome::Fatal { reason }; batch.len()],
                provider_failure: false,
            };
        }
        Ok(ProviderResponse::PerRecipient(entries)) => entries,
    };

    if entries.len() != batch.len() {
        return all_transient(
            batch,
            format!(
                "provider returned {} results for {} recipients",
                entries.len(),
                batch.len()
            ),
        );
    }

    let outcomes: Vec<DeliveryOutcome> = entries.iter().map(classify).collect();

    // Payload-level failure on any entry condemns the whole batch
    if let Some(reason) = outcomes.iter().find_map(|o| match o {
        DeliveryOutcome::Fatal { reason } => Some(reason.clone()),
        _ => None,
    }) {
        return Classified {
            outcomes: vec![DeliveryOutcome::Fatal { reason }; batch.len()],
            provider_failure: false,
        };
    }

    let provider_failure = !outcomes.is_empty() && outcomes.iter().all(DeliveryOutcome::is_transient);

    Classified {
        outcomes,
        provider_failure,
    }
}

/// Every recipient of `batch` is `Transient` for `reason`; counts as a provider failure
pub fn all_transient(batch: &Batch, reason: String) -> Classified {
    Classified {
        outcomes: vec![DeliveryOutcome::Transient { reason }; batch.len()],
        provider_failure: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Admitted, NotificationPayload, Recipient};
    use crate::planner::BatchId;
    use std::sync::Arc;

    fn batch(n: usize) -> Batch {
        Batch {
            id: BatchId { round: 0, index: 0 },
            entries: (0..n)
                .map(|position| Admitted {
                    position,
                    recipient: Recipient::new(format!("token-{:04}", position)),
                })
                .collect(),
            payload: Arc::new(NotificationPayload::new("t", "b")),
        }
    }

    #[test]
    fn test_classification_table() {
        use ProviderErrorCode::*;

        let invalid = [InvalidRegistration, NotRegistered, MismatchedSender];
        for code in invalid {
            assert!(matches!(
                classify(&ProviderEntry::failed(code)),
                DeliveryOutcome::InvalidRecipient { .. }
            ));
        }

        let transient = [
            Unavailable,
            InternalServerError,
            Timeout,
            Throttled,
            Unknown("SomethingNew".to_string()),
        ];
        for code in transient {
            assert!(classify(&ProviderEntry::failed(code)).is_transient());
        }

        for code in [MessageTooBig, InvalidPayload] {
            assert!(matches!(
                classify(&ProviderEntry::failed(code)),
                DeliveryOutcome::Fatal { .. }
            ));
        }

        assert_eq!(
            classify(&ProviderEntry::Replaced {
                message_id: Some("m1".to_string()),
                canonical_id: "canonical".to_string(),
            }),
            DeliveryOutcome::RecipientMoved {
                canonical_id: "canonical".to_string()
            }
        );
    }

    #[test]
    fn test_reason_includes_detail() {
        let outcome = classify(&ProviderEntry::Failed {
            code: ProviderErrorCode::NotRegistered,
            detail: Some("app uninstalled".to_string()),
        });
        assert_eq!(
            outcome,
            DeliveryOutcome::InvalidRecipient {
                reason: "NotRegistered: app uninstalled".to_string()
            }
        );
    }

    #[test]
    fn test_network_error_marks_batch_transient() {
        let classified = classify_response(&batch(3), Err(ProviderError::Network("reset".into())));
        assert!(classified.provider_failure);
        assert_eq!(classified.outcomes.len(), 3);
        assert!(classified.outcomes.iter().all(DeliveryOutcome::is_transient));
    }

    #[test]
    fn test_fatal_entry_condemns_whole_batch() {
        let response = ProviderResponse::PerRecipient(vec![
            ProviderEntry::accepted("m1"),
            ProviderEntry::failed(ProviderErrorCode::MessageTooBig),
            ProviderEntry::failed(ProviderErrorCode::NotRegistered),
        ]);

        let classified = classify_response(&batch(3), Ok(response));
        assert!(!classified.provider_failure);
        assert!(classified
            .outcomes
            .iter()
            .all(|o| matches!(o, DeliveryOutcome::Fatal { .. })));
    }

    #[test]
    fn test_payload_rejected_is_fatal() {
        let classified = classify_response(
            &batch(2),
            Ok(ProviderResponse::PayloadRejected {
                reason: "InvalidParameters".to_string(),
            }),
        );
        assert_eq!(classified.outcomes.len(), 2);
        assert!(classified
            .outcomes
            .iter()
            .all(|o| matches!(o, DeliveryOutcome::Fatal { .. })));
    }

    #[test]
    fn test_mismatched_entry_count_is_unstructured() {
        let response = ProviderResponse::PerRecipient(vec![ProviderEntry::accepted("m1")]);
        let classified = classify_response(&batch(2), Ok(response));
        assert!(classified.provider_failure);
        assert!(classified.outcomes.iter().all(DeliveryOutcome::is_transient));
    }

    #[test]
    fn test_breaker_verdict() {
        let all_unavailable = ProviderResponse::PerRecipient(vec![
            ProviderEntry::failed(ProviderErrorCode::Unavailable),
            ProviderEntry::failed(ProviderErrorCode::Unavailable),
        ]);
        assert!(classify_response(&batch(2), Ok(all_unavailable)).provider_failure);

        let mixed = ProviderResponse::PerRecipient(vec![
            ProviderEntry::accepted("m1"),
            ProviderEntry::failed(ProviderErrorCode::Unavailable),
        ]);
        assert!(!classify_response(&batch(2), Ok(mixed)).provider_failure);
    }
}
