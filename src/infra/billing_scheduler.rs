use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info};

use crate::application::use_cases::{
    billing_cycle::{BillingCycleUseCases, SweepSummary},
    invoice::{InvoiceUseCases, RetrySweep},
};

/// Periodically enqueues due cycles and retries failed invoices.
pub async fn run_billing_scheduler(
    cycles: Arc<BillingCycleUseCases>,
    invoices: Arc<InvoiceUseCases>,
    cycle_every: Duration,
    retry_every: Duration,
) {
    let mut cycle_ticker = interval(cycle_every);
    let mut retry_ticker = interval(retry_every);

    info!(
        "Billing scheduler started (cycle sweep every {}s, retry sweep every {}s)",
        cycle_every.as_secs(),
        retry_every.as_secs()
    );

    loop {
        tokio::select! {
            _ = cycle_ticker.tick() => {
                run_cycle_sweep(&cycles).await;
            }
            _ = retry_ticker.tick() => {
                run_retry_sweep(&invoices).await;
            }
        }
    }
}

pub async fn run_cycle_sweep(cycles: &BillingCycleUseCases) -> Option<SweepSummary> {
    match cycles.cycle_due_subscriptions(true).await {
        Ok(summary) => Some(summary),
        Err(e) => {
            error!(error = %e, "Cycle sweep failed");
            None
        }
    }
}

pub async fn run_retry_sweep(invoices: &InvoiceUseCases) -> Option<RetrySweep> {
    match invoices.retry_failed_invoices().await {
        Ok(sweep) => Some(sweep),
        Err(e) => {
            error!(error = %e, "Retry sweep failed");
            None
        }
    }
}
