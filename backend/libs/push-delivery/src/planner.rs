/// Batch Planner
///
/// Order-preserving chunking of admitted recipients into provider-sized batches.
use crate::error::{DeliveryError, Result};
use crate::model::{Admitted, NotificationPayload, Recipient};
use std::fmt;
use std::sync::Arc;

/// Identifies a batch within one request: dispatch round and index in that round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchId {
    pub round: u32,
    pub index: usize,
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}b{}", self.round, self.index)
    }
}

/// Group of recipients sent in one provider call. Never split after creation.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: BatchId,
    pub entries: Vec<Admitted>,
    pub payload: Arc<NotificationPayload>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn recipients(&self) -> impl Iterator<Item = &Recipient> {
        self.entries.iter().map(|entry| &entry.recipient)
    }

    pub fn registration_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.recipient.id.as_str()).collect()
    }
}

/// Slice `admitted` into consecutive batches of exactly `max_batch_size`
/// (the last may be smaller). Fails on a zero batch size.
pub fn plan(
    admitted: Vec<Admitted>,
    payload: Arc<NotificationPayload>,
    max_batch_size: usize,
    round: u32,
) -> Result<Vec<Batch>> {
    if max_batch_size == 0 {
        return Err(DeliveryError::configuration("max batch size must be positive"));
    }

    let mut batches = Vec::with_capacity(admitted.len().div_ceil(max_batch_size));
    let mut entries = admitted.into_iter().peekable();

    while entries.peek().is_some() {
        let chunk: Vec<Admitted> = entries.by_ref().take(max_batch_size).collect();
        batches.push(Batch {
            id: BatchId {
                round,
                index: batches.len(),
            },
            entries: chunk,
            payload: payload.clone(),
        });
    }

    Ok(batches)
}
