use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Semaphore, mpsc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::job_queue::{BillingJob, JobQueue},
        use_cases::{
            billing_cycle::BillingCycleUseCases,
            invoice::{ChargeMode, InvoiceUseCases},
        },
    },
};

/// Extra attempts a cycle job gets after a transient failure.
const MAX_CYCLE_RETRIES: u32 = 2;
const CYCLE_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// In-process queue feeding `run_billing_job_worker`.
#[derive(Clone)]
pub struct TokioJobQueue {
    tx: mpsc::UnboundedSender<BillingJob>,
}

impl TokioJobQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BillingJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl JobQueue for TokioJobQueue {
    async fn enqueue(&self, job: BillingJob) -> AppResult<()> {
        self.tx
            .send(job)
            .map_err(|_| AppError::Internal("Billing job worker is not running".into()))
    }
}

/// Executes one job at a time; concurrency is the worker loop's business.
#[derive(Clone)]
pub struct BillingJobRunner {
    cycles: Arc<BillingCycleUseCases>,
    invoices: Arc<InvoiceUseCases>,
    retry_backoff: Duration,
}

impl BillingJobRunner {
    pub fn new(cycles: Arc<BillingCycleUseCases>, invoices: Arc<InvoiceUseCases>) -> Self {
        Self {
            cycles,
            invoices,
            retry_backoff: CYCLE_RETRY_BACKOFF,
        }
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub async fn run(&self, job: BillingJob) {
        match job {
            BillingJob::ChargeInvoice { invoice_id } => self.charge(invoice_id).await,
            BillingJob::CycleSubscription { subscription_id } => {
                self.cycle(subscription_id).await
            }
        }
    }

    // No retry here: the invoice's own backoff schedules the next attempt.
    async fn charge(&self, invoice_id: Uuid) {
        match self.invoices.charge(invoice_id).await {
            Ok(invoice) => info!(
                invoice_id = %invoice_id,
                total_paid_cents = invoice.total_paid_cents,
                "Invoice charged"
            ),
            Err(AppError::PaymentFailed(reason)) => {
                info!(invoice_id = %invoice_id, reason = %reason, "Invoice payment failed")
            }
            Err(AppError::Conflict(reason)) => {
                info!(invoice_id = %invoice_id, reason = %reason, "Invoice charge skipped")
            }
            Err(e) => error!(invoice_id = %invoice_id, error = %e, "Charge job failed"),
        }
    }

    async fn cycle(&self, subscription_id: Uuid) {
        let mut attempt = 0;
        loop {
            match self
                .cycles
                .cycle_billing_period(subscription_id, ChargeMode::Deferred)
                .await
            {
                Ok(_) => return,
                Err(e) if e.is_retryable() && attempt < MAX_CYCLE_RETRIES => {
                    attempt += 1;
                    warn!(
                        subscription_id = %subscription_id,
                        attempt,
                        error = %e,
                        "Cycle job failed, retrying"
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => {
                    error!(
                        subscription_id = %subscription_id,
                        error = %e,
                        "Cycle job failed"
                    );
                    return;
                }
            }
        }
    }
}

pub async fn run_billing_job_worker(
    mut jobs: mpsc::UnboundedReceiver<BillingJob>,
    runner: BillingJobRunner,
    max_concurrent: usize,
) {
    let semaphore = Arc::new(Semaphore::new(max_concurrent));

    info!(
        "Billing job worker started (max {} concurrent)",
        max_concurrent
    );

    while let Some(job) = jobs.recv().await {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let runner = runner.clone();
        tokio::spawn(async move {
            runner.run(job).await;
            drop(permit);
        });
    }

    info!("Billing job worker stopped");
}
