use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_error::AppResult;

/// Deferred billing work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum BillingJob {
    /// Cycle one subscription. Retried a couple of times on transient errors.
    CycleSubscription { subscription_id: Uuid },
    /// Attempt one charge. Never retried by the runner; the invoice's own
    /// backoff decides when the next attempt happens.
    ChargeInvoice { invoice_id: Uuid },
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: BillingJob) -> AppResult<()>;
}
