/// Registration Lifecycle Manager
///
/// Turns a finished report into registry maintenance: identifiers the
/// provider no longer knows are removed, moved identifiers are rewritten to
/// their canonical replacement. Storage lives behind [`RegistryUpdater`].
use crate::model::FinalOutcome;
use crate::report::DeliveryReport;
use async_trait::async_trait;
use resilience::with_timeout;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Replacement {
    pub old: String,
    pub new: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("Registry update failed: {0}")]
    UpdateFailed(String),
}

/// External registry of device registrations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegistryUpdater: Send + Sync {
    /// Retire identifiers; returns the number of rows affected
    async fn remove(&self, ids: &[String]) -> Result<u64, RegistryError>;

    /// Rewrite identifiers to their canonical replacement
    async fn replace(&self, pairs: &[Replacement]) -> Result<u64, RegistryError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub to_remove: Vec<String>,
    pub to_replace: Vec<Replacement>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_replace.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub removed: u64,
    pub replaced: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct RegistrationLifecycleManager {
    updater: Arc<dyn RegistryUpdater>,
    call_timeout: Duration,
}

impl RegistrationLifecycleManager {
    pub fn new(updater: Arc<dyn RegistryUpdater>, call_timeout: Duration) -> Self {
        Self {
            updater,
            call_timeout,
        }
    }

    /// Registry changes implied by `report`, de-duplicated in report order.
    /// Empty identifiers have no registry row and are skipped.
    pub fn reconcile(report: &DeliveryReport) -> ReconcilePlan {
        let mut plan = ReconcilePlan::default();
        let mut seen_remove = HashSet::new();
        let mut seen_replace = HashSet::new();

        for entry in &report.entries {
            let id = &entry.recipient.id;
            if id.is_empty() {
                continue;
            }

            match &entry.outcome {
                FinalOutcome::InvalidRecipient { .. } => {
                    if seen_remove.insert(id.clone()) {
                        plan.to_remove.push(id.clone());
                    }
                }
                FinalOutcome::RecipientMoved { canonical_id } => {
                    let pair = Replacement {
                        old: id.clone(),
                        new: canonical_id.clone(),
                    };
                    if seen_replace.insert(pair.clone()) {
                        plan.to_replace.push(pair);
                    }
                }
                _ => {}
            }
        }

        plan
    }

    /// Apply `plan` best-effort. Failures are logged and returned, never raised.
    pub async fn apply(&self, plan: ReconcilePlan) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();

        if !plan.to_remove.is_empty() {
            match with_timeout(self.call_timeout, self.updater.remove(&plan.to_remove)).await {
                Ok(Ok(removed)) => outcome.removed = removed,
                Ok(Err(e)) => {
                    warn!("Failed to remove {} registrations: {}", plan.to_remove.len(), e);
                    outcome.errors.push(e.to_string());
                }
                Err(e) => {
                    warn!("Registry removal timed out: {}", e);
                    outcome.errors.push(e.to_string());
                }
            }
        }

        if !plan.to_replace.is_empty() {
            match with_timeout(self.call_timeout, self.updater.replace(&plan.to_replace)).await {
                Ok(Ok(replaced)) => outcome.replaced = replaced,
                Ok(Err(e)) => {
                    warn!("Failed to replace {} registrations: {}", plan.to_replace.len(), e);
                    outcome.errors.push(e.to_string());
                }
                Err(e) => {
                    warn!("Registry replacement timed out: {}", e);
                    outcome.errors.push(e.to_string());
                }
            }
        }

        info!(
            removed = outcome.removed,
            replaced = outcome.replaced,
            errors = outcome.errors.len(),
            "registry reconciliation finished"
        );

        outcome
    }
}
