use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::{
            billing_hooks::BillingHooks,
            clock::Clock,
            job_queue::{BillingJob, JobQueue},
            owner_directory::{OwnerDirectory, OwnerProfile},
            payment_gateway::{ChargeRequest, ChargeResult, PaymentGatewayPort, PaymentSource},
        },
        settings::BillingSettings,
        use_cases::{
            billing_cycle::BillingLedgerRepo,
            subscription::{SubscriptionRepo, SubscriptionUseCases},
        },
    },
    domain::entities::{
        invoice::{Invoice, InvoicePaymentStatus, InvoiceStatus, MAX_RETRIES},
        invoice_item::{ChargeableItem, InvoiceItem, subtotal_cents},
        subscription_status::{StatusTransition, SubscriptionStatus},
    },
};

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait InvoiceRepo: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Invoice>>;
    async fn get_open_for_owner(&self, owner_id: Uuid) -> AppResult<Option<Invoice>>;
    async fn list_for_owner(
        &self,
        owner_id: Uuid,
        status: Option<InvoiceStatus>,
    ) -> AppResult<Vec<Invoice>>;
    async fn count_for_owner(&self, owner_id: Uuid, status: Option<InvoiceStatus>)
    -> AppResult<i64>;
    /// Ready-for-payment invoices with fewer than `max_failed_attempts` failures.
    async fn list_retryable(&self, max_failed_attempts: i32) -> AppResult<Vec<Invoice>>;
    async fn list_items(&self, invoice_id: Uuid) -> AppResult<Vec<ChargeableItem>>;
    /// Links an item. Fails with `NotFound` for an unknown invoice, `InvalidState` unless
    /// the invoice is open and `InvalidInput` if the item already sits on an invoice.
    async fn add_item(&self, item: &InvoiceItem) -> AppResult<InvoiceItem>;
    /// Optimistic save keyed on `lock_version`; see `SubscriptionRepo::save`.
    async fn save(&self, invoice: &Invoice) -> AppResult<Invoice>;
    /// Cancels every ready-for-payment invoice of the owner. Returns how many.
    async fn cancel_ready_for_payment(&self, owner_id: Uuid, now: DateTime<Utc>) -> AppResult<u64>;
    /// Earliest `paid_at` among the owner's paid invoices with a non-zero total.
    async fn earliest_paid_at(&self, owner_id: Uuid) -> AppResult<Option<DateTime<Utc>>>;
}

/// Builds (without storing) the next open invoice for `owner`, snapshotting its payment
/// references.
pub async fn new_open_invoice(
    repo: &dyn InvoiceRepo,
    owner: &OwnerProfile,
    now: DateTime<Utc>,
) -> AppResult<Invoice> {
    let ordinal = repo.count_for_owner(owner.id, None).await? + 1;
    Ok(Invoice::open(
        owner.id,
        Invoice::slug_for(owner.id, ordinal),
        owner.stripe_customer_id.clone(),
        owner.stripe_token.clone(),
        now,
    ))
}

// ============================================================================
// Types
// ============================================================================

/// How a closed invoice gets paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeMode {
    /// Charge inline. Failures are logged and recorded on the invoice, never returned.
    Synchronous,
    /// Hand a charge job to the queue.
    #[default]
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetrySweep {
    pub examined: usize,
    pub enqueued: usize,
}

const GATEWAY_FAILURE_MESSAGE: &str =
    "I'm sorry, but there was an error with our payment processor. Your card was not charged.";

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct InvoiceUseCases {
    invoice_repo: Arc<dyn InvoiceRepo>,
    subscription_repo: Arc<dyn SubscriptionRepo>,
    ledger: Arc<dyn BillingLedgerRepo>,
    subscriptions: Arc<SubscriptionUseCases>,
    owners: Arc<dyn OwnerDirectory>,
    gateway: Arc<dyn PaymentGatewayPort>,
    jobs: Arc<dyn JobQueue>,
    hooks: Arc<dyn BillingHooks>,
    clock: Arc<dyn Clock>,
    settings: Arc<BillingSettings>,
}

impl InvoiceUseCases {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        invoice_repo: Arc<dyn InvoiceRepo>,
        subscription_repo: Arc<dyn SubscriptionRepo>,
        ledger: Arc<dyn BillingLedgerRepo>,
        subscriptions: Arc<SubscriptionUseCases>,
        owners: Arc<dyn OwnerDirectory>,
        gateway: Arc<dyn PaymentGatewayPort>,
        jobs: Arc<dyn JobQueue>,
        hooks: Arc<dyn BillingHooks>,
        clock: Arc<dyn Clock>,
        settings: Arc<BillingSettings>,
    ) -> Self {
        Self {
            invoice_repo,
            subscription_repo,
            ledger,
            subscriptions,
            owners,
            gateway,
            jobs,
            hooks,
            clock,
            settings,
        }
    }

    pub async fn get(&self, invoice_id: Uuid) -> AppResult<Invoice> {
        self.invoice_repo
            .get_by_id(invoice_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn list_items(&self, invoice_id: Uuid) -> AppResult<Vec<ChargeableItem>> {
        self.invoice_repo.list_items(invoice_id).await
    }

    pub async fn add_item(&self, invoice_id: Uuid, item: &ChargeableItem) -> AppResult<InvoiceItem> {
        let invoice = self.get(invoice_id).await?;
        if invoice.status != InvoiceStatus::Open {
            return Err(AppError::InvalidState(format!(
                "Items can only be added to an open invoice; {} is {}",
                invoice.slug, invoice.status
            )));
        }
        self.invoice_repo
            .add_item(&InvoiceItem::link(invoice.id, item, self.clock.now()))
            .await
    }

    /// Closes an open invoice for payment and opens the owner's next one.
    pub async fn ready_for_payment(&self, invoice_id: Uuid) -> AppResult<Invoice> {
        let invoice = self.get(invoice_id).await?;
        if invoice.status != InvoiceStatus::Open {
            return Err(AppError::InvalidState(format!(
                "Invoice {} is {}, only open invoices can be closed",
                invoice.slug, invoice.status
            )));
        }
        let owner = self.owner_of(&invoice).await?;

        let items = self.invoice_repo.list_items(invoice.id).await?;
        let now = self.clock.now();
        let mut closing = invoice;
        closing.mark_ready_for_payment(items.len(), now);
        let fresh = new_open_invoice(self.invoice_repo.as_ref(), &owner, now).await?;

        let closed = self.ledger.rotate_open_invoice(&closing, &fresh).await?;
        info!(
            invoice_id = %closed.id,
            status = %closed.status,
            items = items.len(),
            "Invoice closed"
        );
        Ok(closed)
    }

    pub async fn ready_for_payment_and_charge(
        &self,
        invoice_id: Uuid,
        mode: ChargeMode,
    ) -> AppResult<Invoice> {
        let closed = self.ready_for_payment(invoice_id).await?;
        self.trigger_payment(closed, mode).await
    }

    /// Starts collection of a ready invoice. Returns the freshest copy of the invoice.
    pub async fn trigger_payment(&self, invoice: Invoice, mode: ChargeMode) -> AppResult<Invoice> {
        if invoice.status != InvoiceStatus::ReadyForPayment {
            return Ok(invoice);
        }

        match mode {
            ChargeMode::Deferred => {
                self.jobs
                    .enqueue(BillingJob::ChargeInvoice {
                        invoice_id: invoice.id,
                    })
                    .await?;
                Ok(invoice)
            }
            ChargeMode::Synchronous => match self.charge(invoice.id).await {
                Ok(paid) => Ok(paid),
                Err(e) => {
                    error!(invoice_id = %invoice.id, error = %e, "Invoice failed to charge");
                    self.get(invoice.id).await
                }
            },
        }
    }

    /// Charges a ready invoice.
    ///
    /// The invoice is claimed first (an optimistic `lock_version` bump with
    /// `charge_started_at` set), so a concurrent attempt gets `Conflict` before reaching the
    /// gateway. A failed attempt is recorded on the invoice and then surfaced as
    /// `PaymentFailed` carrying the message to show the owner.
    pub async fn charge(&self, invoice_id: Uuid) -> AppResult<Invoice> {
        let invoice = self.get(invoice_id).await?;
        if invoice.status != InvoiceStatus::ReadyForPayment {
            return Err(AppError::InvalidState(format!(
                "Invoice {} is {}, not ready for payment",
                invoice.slug, invoice.status
            )));
        }
        if !invoice.payment_status.is_chargeable() {
            return Err(AppError::InvalidState(format!(
                "Invoice {} has payment status {}",
                invoice.slug, invoice.payment_status
            )));
        }

        let owner = self.owner_of(&invoice).await?;
        let items = self.invoice_repo.list_items(invoice.id).await?;
        let claimed = self.claim(invoice, &owner).await?;

        let subtotal = subtotal_cents(&items);
        let billing_state = self.billing_state(&claimed, &owner).await;
        let tax = self.settings.tax_rates.tax_owed_cents(
            owner.tax_exempt,
            billing_state.as_deref(),
            subtotal,
        );
        // A credit (negative subtotal) settles the invoice at zero.
        let total = (subtotal + tax).max(0);

        let charged = if total > 0 {
            match self.collect(&claimed, &owner, total).await {
                Ok(result) => Some(result),
                Err(e) => return self.fail(claimed, &items, e).await,
            }
        } else {
            None
        };
        let charge_id = charged.as_ref().map(|c| c.charge_id.clone());

        let mut paid = claimed.clone();
        paid.record_payment(
            total,
            tax,
            charge_id.clone(),
            charged.map(|c| c.card),
            self.clock.now(),
        );
        let saved = match self.invoice_repo.save(&paid).await {
            Ok(saved) => saved,
            Err(e) => {
                if let Some(charge_id) = charge_id.as_deref() {
                    self.reverse_charge(&claimed, charge_id).await;
                }
                return self.fail(claimed, &items, e).await;
            }
        };

        info!(
            invoice_id = %saved.id,
            total_cents = saved.total_paid_cents,
            tax_cents = saved.tax_paid_cents,
            "Invoice paid"
        );

        self.unsuspend_if_safe(saved.owner_id).await?;
        self.hooks.payment_attempt_successful(&saved).await;
        if saved.total_paid_cents > 0 {
            self.subscriptions
                .update_first_paid_at(saved.owner_id, false)
                .await?;
        }
        Ok(saved)
    }

    /// Refunds a paid invoice in full.
    pub async fn refund(&self, invoice_id: Uuid) -> AppResult<Invoice> {
        let mut invoice = self.get(invoice_id).await?;
        match (invoice.status, invoice.payment_status) {
            (InvoiceStatus::Paid, InvoicePaymentStatus::PaymentSucceeded) => {}
            (_, InvoicePaymentStatus::PaymentPartiallyRefunded) => {
                return Err(AppError::NotImplemented(
                    "Refunding a partially refunded invoice is not supported".into(),
                ));
            }
            _ => {
                return Err(AppError::InvalidState(
                    "Unable to refund an invoice that isn't in payment_successful status".into(),
                ));
            }
        }

        if invoice.total_paid_cents > 0 {
            let charge_id = self.paid_charge_id(&invoice)?;
            let charge = self.gateway.retrieve_charge(&charge_id).await?;
            if !self.gateway.refund(&charge.charge_id, None).await? {
                return Err(AppError::PaymentGateway(format!(
                    "Refund of invoice {} was not accepted",
                    invoice.slug
                )));
            }
        }

        invoice.record_full_refund(self.clock.now());
        let saved = self.invoice_repo.save(&invoice).await?;
        info!(
            invoice_id = %saved.id,
            refunded_cents = saved.amount_refunded_cents(),
            "Invoice refunded"
        );
        Ok(saved)
    }

    /// Refunds only the tax portion. `None` when no tax was paid.
    pub async fn refund_tax(&self, invoice_id: Uuid) -> AppResult<Option<Invoice>> {
        let mut invoice = self.get(invoice_id).await?;
        if invoice.tax_paid_cents == 0 {
            return Ok(None);
        }
        match (invoice.status, invoice.payment_status) {
            (InvoiceStatus::Paid, InvoicePaymentStatus::PaymentSucceeded) => {}
            (_, InvoicePaymentStatus::PaymentPartiallyRefunded) => {
                return Err(AppError::NotImplemented(
                    "Refunding tax on a partially refunded invoice is not supported".into(),
                ));
            }
            _ => {
                return Err(AppError::InvalidState(
                    "Unable to refund tax on an invoice that isn't in payment_successful status"
                        .into(),
                ));
            }
        }

        let charge_id = self.paid_charge_id(&invoice)?;
        if !self
            .gateway
            .refund(&charge_id, Some(invoice.tax_paid_cents))
            .await?
        {
            return Err(AppError::PaymentGateway(format!(
                "Tax refund of invoice {} was not accepted",
                invoice.slug
            )));
        }

        invoice.record_tax_refund(self.clock.now());
        let saved = self.invoice_repo.save(&invoice).await?;
        info!(invoice_id = %saved.id, tax_cents = saved.tax_refunded_cents, "Tax refunded");
        Ok(Some(saved))
    }

    /// Enqueues a charge for every invoice whose backoff has elapsed.
    pub async fn retry_failed_invoices(&self) -> AppResult<RetrySweep> {
        let now = self.clock.now();
        let candidates = self.invoice_repo.list_retryable(MAX_RETRIES).await?;
        let mut sweep = RetrySweep {
            examined: candidates.len(),
            enqueued: 0,
        };

        for invoice in candidates.iter().filter(|i| i.ready_to_retry(now)) {
            self.jobs
                .enqueue(BillingJob::ChargeInvoice {
                    invoice_id: invoice.id,
                })
                .await?;
            sweep.enqueued += 1;
        }

        info!(
            examined = sweep.examined,
            enqueued = sweep.enqueued,
            "Retry sweep finished"
        );
        Ok(sweep)
    }

    pub async fn cancel_outstanding_invoices(&self, owner_id: Uuid) -> AppResult<u64> {
        let cancelled = self
            .invoice_repo
            .cancel_ready_for_payment(owner_id, self.clock.now())
            .await?;
        info!(owner_id = %owner_id, cancelled, "Outstanding invoices cancelled");
        Ok(cancelled)
    }

    /// Charges every outstanding invoice of the owner, stopping at the first failure,
    /// then puts the subscription back in good standing.
    pub async fn bill_outstanding_invoices(&self, owner_id: Uuid) -> AppResult<Vec<Invoice>> {
        let outstanding = self
            .invoice_repo
            .list_for_owner(owner_id, Some(InvoiceStatus::ReadyForPayment))
            .await?;

        let mut paid = Vec::with_capacity(outstanding.len());
        for invoice in outstanding {
            paid.push(self.charge(invoice.id).await?);
        }

        if let Some(subscription) = self.subscription_repo.get_by_owner(owner_id).await?
            && subscription.status != SubscriptionStatus::GoodStanding
        {
            self.subscriptions
                .apply_transition(subscription, StatusTransition::GoodStanding)
                .await?;
        }
        Ok(paid)
    }

    async fn owner_of(&self, invoice: &Invoice) -> AppResult<OwnerProfile> {
        self.owners.get_owner(invoice.owner_id).await?.ok_or_else(|| {
            AppError::Consistency(format!(
                "Owner {} of invoice {} does not exist",
                invoice.owner_id, invoice.slug
            ))
        })
    }

    async fn claim(&self, mut invoice: Invoice, owner: &OwnerProfile) -> AppResult<Invoice> {
        let now = self.clock.now();
        if invoice.charge_in_progress(now, self.settings.charge_claim_ttl()) {
            return Err(AppError::Conflict(format!(
                "Invoice {} is already being charged",
                invoice.slug
            )));
        }
        // A card added after the invoice was opened.
        if invoice.stripe_customer_id.is_none() && invoice.stripe_token.is_none() {
            invoice.stripe_customer_id = owner.stripe_customer_id.clone();
            invoice.stripe_token = owner.stripe_token.clone();
        }
        invoice.charge_started_at = Some(now);
        invoice.updated_at = now;
        self.invoice_repo.save(&invoice).await
    }

    /// State whose tax rate applies: the card's address for token charges, the owner's
    /// billing address for customer charges.
    async fn billing_state(&self, invoice: &Invoice, owner: &OwnerProfile) -> Option<String> {
        if let Some(token) = invoice.stripe_token.as_deref().filter(|t| !t.is_empty()) {
            return match self.gateway.retrieve_token(token).await {
                Ok(info) => info.card_address_state,
                Err(e) => {
                    warn!(invoice_id = %invoice.id, error = %e, "Could not look up card address");
                    None
                }
            };
        }
        if invoice.stripe_customer_id.is_some() {
            return owner.billing_state.clone();
        }
        None
    }

    async fn collect(
        &self,
        invoice: &Invoice,
        owner: &OwnerProfile,
        total_cents: i64,
    ) -> AppResult<ChargeResult> {
        let source = PaymentSource::select(
            invoice.stripe_customer_id.as_deref(),
            invoice.stripe_token.as_deref(),
        )
        .ok_or_else(|| AppError::PaymentDeclined("No payment method on file".into()))?;

        let request = ChargeRequest {
            amount_cents: total_cents,
            currency: self.settings.currency.clone(),
            description: format!("Subscription for {}", owner.display_name),
            source,
            idempotency_key: format!(
                "invoice-{}-attempt-{}",
                invoice.id, invoice.failed_payment_attempt_count
            ),
        };

        match tokio::time::timeout(self.settings.gateway_timeout, self.gateway.charge(&request))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(AppError::PaymentGateway(format!(
                "Charge timed out after {}ms",
                self.settings.gateway_timeout.as_millis()
            ))),
        }
    }

    async fn reverse_charge(&self, invoice: &Invoice, charge_id: &str) {
        match self.gateway.refund(charge_id, None).await {
            Ok(true) => warn!(invoice_id = %invoice.id, charge_id, "Charge reversed"),
            Ok(false) => error!(invoice_id = %invoice.id, charge_id, "Charge reversal rejected"),
            Err(e) => error!(
                invoice_id = %invoice.id,
                charge_id,
                error = %e,
                "Charge reversal failed"
            ),
        }
    }

    async fn fail(
        &self,
        mut invoice: Invoice,
        items: &[ChargeableItem],
        cause: AppError,
    ) -> AppResult<Invoice> {
        invoice.record_failed_attempt(failure_reason(&cause), self.clock.now());
        let saved = self.invoice_repo.save(&invoice).await?;
        warn!(
            invoice_id = %saved.id,
            attempts = saved.failed_payment_attempt_count,
            error = %cause,
            "Charge attempt failed"
        );

        if saved.failed_payment_attempt_count >= self.settings.suspend_after_failed_attempts
            && items.iter().any(ChargeableItem::is_subscription_period)
            && let Some(subscription) = self.subscription_repo.get_by_owner(saved.owner_id).await?
            && subscription.status != SubscriptionStatus::SuspendedPaymentFailed
        {
            self.subscriptions
                .apply_transition(subscription, StatusTransition::SuspendedPaymentFailed)
                .await?;
        }

        self.hooks.payment_attempt_failed(&saved).await;
        Err(AppError::PaymentFailed(owner_message(&saved, &cause)))
    }

    async fn unsuspend_if_safe(&self, owner_id: Uuid) -> AppResult<()> {
        let outstanding = self
            .invoice_repo
            .count_for_owner(owner_id, Some(InvoiceStatus::ReadyForPayment))
            .await?;
        if outstanding > 0 {
            return Ok(());
        }
        if let Some(subscription) = self.subscription_repo.get_by_owner(owner_id).await?
            && subscription.status == SubscriptionStatus::SuspendedPaymentFailed
        {
            self.subscriptions
                .unsuspend_for_payment_failed(subscription)
                .await?;
        }
        Ok(())
    }

    fn paid_charge_id(&self, invoice: &Invoice) -> AppResult<String> {
        invoice.stripe_charge_id.clone().ok_or_else(|| {
            AppError::Consistency(format!("Invoice {} was paid without a charge", invoice.slug))
        })
    }
}

/// What gets stored as `last_failed_payment_error`.
fn failure_reason(error: &AppError) -> String {
    match error {
        AppError::PaymentDeclined(msg) | AppError::PaymentGateway(msg) => msg.clone(),
        other => other.to_string(),
    }
}

/// What the owner is told.
fn owner_message(invoice: &Invoice, error: &AppError) -> String {
    match error {
        AppError::PaymentDeclined(msg) => msg.clone(),
        AppError::PaymentGateway(_) => GATEWAY_FAILURE_MESSAGE.to_string(),
        _ => format!(
            "There was an error with our payment processor. Invoice {} was not paid.",
            invoice.slug
        ),
    }
}
