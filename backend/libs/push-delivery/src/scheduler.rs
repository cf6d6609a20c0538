/// Retry Scheduler
///
/// Decides what happens to recipients that came back `Transient`: another
/// dispatch round after a backoff delay, or terminal failure once the retry
/// budget is spent. Performs no I/O; the engine sleeps and dispatches.
use crate::error::Result;
use crate::model::{Admitted, NotificationPayload};
use crate::planner::{plan, Batch};
use resilience::RetryConfig;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub enum RetryDecision {
    /// Nothing left to retry
    Idle,
    /// Dispatch `batches` as round `round` after waiting `delay`
    Retry {
        round: u32,
        batches: Vec<Batch>,
        delay: Duration,
    },
    /// Retry budget spent; these recipients are terminal failures
    Exhausted(Vec<Admitted>),
}

#[derive(Debug, Clone)]
pub struct RetryScheduler {
    config: RetryConfig,
    max_batch_size: usize,
}

impl RetryScheduler {
    pub fn new(config: RetryConfig, max_batch_size: usize) -> Self {
        Self {
            config,
            max_batch_size,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Delay before the retry that follows `retries_done` earlier retries
    pub fn delay_for(&self, retries_done: u32) -> Duration {
        self.config.delay_for(retries_done)
    }

    /// Re-batch `transient` recipients for the next round, in input order
    pub fn schedule(
        &self,
        mut transient: Vec<Admitted>,
        payload: &Arc<NotificationPayload>,
        retries_done: u32,
    ) -> Result<RetryDecision> {
        if transient.is_empty() {
            return Ok(RetryDecision::Idle);
        }

        if !self.config.should_retry(retries_done) {
            return Ok(RetryDecision::Exhausted(transient));
        }

        transient.sort_by_key(|admitted| admitted.position);

        let round = retries_done + 1;
        let batches = plan(transient, payload.clone(), self.max_batch_size, round)?;

        Ok(RetryDecision::Retry {
            round,
            batches,
            delay: self.delay_for(retries_done),
        })
    }
}
