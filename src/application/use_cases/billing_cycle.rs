use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::{
            billing_hooks::{BillingHooks, notify_transition},
            clock::Clock,
            job_queue::{BillingJob, JobQueue},
            owner_directory::{OwnerDirectory, OwnerProfile},
        },
        settings::BillingSettings,
        use_cases::{
            invoice::{ChargeMode, InvoiceRepo, InvoiceUseCases, new_open_invoice},
            subscription::{
                CreateSubscriptionInput, SubscriptionPeriodRepo, SubscriptionRepo,
                SubscriptionUseCases,
            },
        },
    },
    domain::entities::{
        invoice::Invoice,
        subscription::Subscription,
        subscription_period::SubscriptionPeriod,
        subscription_status::{StatusTransition, SubscriptionStatus},
    },
};

// ============================================================================
// Repository Trait
// ============================================================================

/// Multi-row writes that must land together.
#[async_trait]
pub trait BillingLedgerRepo: Send + Sync {
    /// Inserts a new subscription and, unless the owner already has one, the open invoice.
    async fn open_subscription(
        &self,
        subscription: &Subscription,
        invoice: &Invoice,
    ) -> AppResult<Subscription>;

    /// Writes one billing cycle atomically. Fails with `Conflict` if the subscription or
    /// invoice moved, or the period to close is no longer open.
    async fn commit_cycle(&self, commit: &CycleCommit) -> AppResult<CommittedCycle>;

    /// Saves a closed invoice and inserts the owner's next open invoice.
    async fn rotate_open_invoice(&self, closing: &Invoice, fresh: &Invoice) -> AppResult<Invoice>;

    /// Saves the subscription and cancels all of the owner's ready-for-payment invoices.
    async fn cancel_for_payment_failure(
        &self,
        subscription: &Subscription,
    ) -> AppResult<(Subscription, u64)>;
}

/// Everything one cycle changes.
#[derive(Debug, Clone)]
pub struct CycleCommit {
    pub subscription: Subscription,
    pub closed_period: Option<SubscriptionPeriod>,
    /// Linked to `billed_invoice` as a line item.
    pub opened_period: Option<SubscriptionPeriod>,
    pub billed_invoice: Invoice,
    pub fresh_invoice: Invoice,
}

#[derive(Debug, Clone)]
pub struct CommittedCycle {
    pub subscription: Subscription,
    pub billed_invoice: Invoice,
    pub fresh_invoice: Invoice,
}

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// The bill date has not arrived.
    NotDue { subscription: Subscription },
    /// A pending cancellation took effect.
    Cancelled {
        subscription: Subscription,
        billed_invoice: Invoice,
    },
    /// The trial ran out with no card on file.
    TrialExpired {
        subscription: Subscription,
        billed_invoice: Invoice,
    },
    Cycled {
        subscription: Subscription,
        period: SubscriptionPeriod,
        billed_invoice: Invoice,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub due: usize,
    pub cycled: usize,
    pub enqueued: usize,
    pub failed: usize,
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct BillingCycleUseCases {
    subscription_repo: Arc<dyn SubscriptionRepo>,
    period_repo: Arc<dyn SubscriptionPeriodRepo>,
    invoice_repo: Arc<dyn InvoiceRepo>,
    ledger: Arc<dyn BillingLedgerRepo>,
    subscriptions: Arc<SubscriptionUseCases>,
    invoices: Arc<InvoiceUseCases>,
    owners: Arc<dyn OwnerDirectory>,
    jobs: Arc<dyn JobQueue>,
    hooks: Arc<dyn BillingHooks>,
    clock: Arc<dyn Clock>,
    settings: Arc<BillingSettings>,
}

impl BillingCycleUseCases {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        subscription_repo: Arc<dyn SubscriptionRepo>,
        period_repo: Arc<dyn SubscriptionPeriodRepo>,
        invoice_repo: Arc<dyn InvoiceRepo>,
        ledger: Arc<dyn BillingLedgerRepo>,
        subscriptions: Arc<SubscriptionUseCases>,
        invoices: Arc<InvoiceUseCases>,
        owners: Arc<dyn OwnerDirectory>,
        jobs: Arc<dyn JobQueue>,
        hooks: Arc<dyn BillingHooks>,
        clock: Arc<dyn Clock>,
        settings: Arc<BillingSettings>,
    ) -> Self {
        Self {
            subscription_repo,
            period_repo,
            invoice_repo,
            ledger,
            subscriptions,
            invoices,
            owners,
            jobs,
            hooks,
            clock,
            settings,
        }
    }

    /// Creates a subscription and runs its first cycle, opening the initial period.
    pub async fn subscribe(
        &self,
        input: CreateSubscriptionInput,
        mode: ChargeMode,
    ) -> AppResult<CycleOutcome> {
        let subscription = self.subscriptions.create(input).await?;
        self.cycle_billing_period(subscription.id, mode).await
    }

    pub async fn subscribe_to_plan(
        &self,
        owner_id: Uuid,
        plan_id: Uuid,
        trialing: bool,
        mode: ChargeMode,
    ) -> AppResult<CycleOutcome> {
        let subscription = self
            .subscriptions
            .create_from_plan(owner_id, plan_id, trialing)
            .await?;
        self.cycle_billing_period(subscription.id, mode).await
    }

    /// Closes the current period, opens the next one, bills it and opens a fresh invoice.
    ///
    /// Concurrent cycles of one subscription are serialized by the ledger commit: the
    /// loser gets `Conflict` and nothing it computed is written.
    pub async fn cycle_billing_period(
        &self,
        subscription_id: Uuid,
        mode: ChargeMode,
    ) -> AppResult<CycleOutcome> {
        let mut subscription = self.subscriptions.get(subscription_id).await?;
        let now = self.clock.now();

        if subscription.next_bill_date > now {
            return Ok(CycleOutcome::NotDue { subscription });
        }
        if subscription.next_bill_date <= now - Duration::days(self.settings.max_overdue_days) {
            return Err(AppError::Consistency(format!(
                "Subscription {} was due {} and is more than {} days overdue",
                subscription.id, subscription.next_bill_date, self.settings.max_overdue_days
            )));
        }

        let owner = self
            .owners
            .get_owner(subscription.owner_id)
            .await?
            .ok_or_else(|| {
                AppError::Consistency(format!(
                    "Owner {} of subscription {} does not exist",
                    subscription.owner_id, subscription.id
                ))
            })?;
        let mut applied = Vec::new();

        if subscription.status == SubscriptionStatus::CancelAtEnd {
            subscription.apply(StatusTransition::Cancelled, now)?;
            applied.push(StatusTransition::Cancelled);
            let closed_period = self
                .period_repo
                .get_current(subscription.id)
                .await?
                .map(|mut period| {
                    period.close(now, now);
                    period
                });

            let (subscription, billed_invoice) = self
                .close_out(subscription, closed_period, &owner, &applied, mode)
                .await?;
            return Ok(CycleOutcome::Cancelled {
                subscription,
                billed_invoice,
            });
        }

        if subscription.status == SubscriptionStatus::Trialing
            && self.period_repo.count_for_subscription(subscription.id).await? > 0
        {
            if owner.has_valid_card_on_file {
                subscription.apply(StatusTransition::GoodStanding, now)?;
                applied.push(StatusTransition::GoodStanding);
            } else {
                subscription.apply(StatusTransition::TrialExpired, now)?;
                applied.push(StatusTransition::TrialExpired);
                let (subscription, billed_invoice) = self
                    .close_out(subscription, None, &owner, &applied, mode)
                    .await?;
                return Ok(CycleOutcome::TrialExpired {
                    subscription,
                    billed_invoice,
                });
            }
        }

        if !matches!(
            subscription.status,
            SubscriptionStatus::GoodStanding | SubscriptionStatus::Trialing
        ) {
            return Err(AppError::InvalidState(format!(
                "Cannot cycle subscription {} in {}",
                subscription.id, subscription.status
            )));
        }

        let mut billed_invoice = self.open_invoice_of(&owner).await?;

        let closed_period = self
            .period_repo
            .get_current(subscription.id)
            .await?
            .map(|mut period| {
                period.close(now - Duration::seconds(1), now);
                period
            });

        let period = SubscriptionPeriod::open(
            subscription.id,
            subscription.amount_cents_next_period,
            now,
            now,
        );
        let period = self
            .hooks
            .prepare_next_period(&subscription, period, closed_period.as_ref());

        subscription.amount_cents_next_period = subscription.amount_cents_base;
        subscription.next_bill_date = if subscription.status == SubscriptionStatus::Trialing {
            now + Duration::days(self.settings.trial_days)
        } else {
            subscription
                .interval
                .advance(subscription.next_bill_date)
                .ok_or_else(|| {
                    AppError::Consistency(format!(
                        "Bill date for subscription {} is out of range",
                        subscription.id
                    ))
                })?
        };
        subscription.updated_at = now;
        self.hooks
            .prepare_subscription_for_next_period(&mut subscription, &period);

        let existing_items = self.invoice_repo.list_items(billed_invoice.id).await?.len();
        billed_invoice.mark_ready_for_payment(existing_items + 1, now);
        let fresh_invoice = new_open_invoice(self.invoice_repo.as_ref(), &owner, now).await?;

        let committed = self
            .ledger
            .commit_cycle(&CycleCommit {
                subscription,
                closed_period,
                opened_period: Some(period.clone()),
                billed_invoice,
                fresh_invoice,
            })
            .await?;

        info!(
            subscription_id = %committed.subscription.id,
            period_id = %period.id,
            amount_cents = period.amount_cents,
            next_bill_date = %committed.subscription.next_bill_date,
            invoice_id = %committed.billed_invoice.id,
            "Billing period cycled"
        );
        for transition in &applied {
            notify_transition(self.hooks.as_ref(), *transition, &committed.subscription).await;
        }

        let billed_invoice = self
            .invoices
            .trigger_payment(committed.billed_invoice, mode)
            .await?;
        let subscription = self.subscriptions.get(subscription_id).await?;

        Ok(CycleOutcome::Cycled {
            subscription,
            period,
            billed_invoice,
        })
    }

    /// Cycles (or enqueues) every subscription that is due.
    ///
    /// Per-subscription errors are logged and counted; the sweep keeps going.
    pub async fn cycle_due_subscriptions(&self, deferred: bool) -> AppResult<SweepSummary> {
        let due = self
            .subscription_repo
            .list_ready_to_cycle(self.clock.now())
            .await?;
        let mut summary = SweepSummary {
            due: due.len(),
            ..SweepSummary::default()
        };

        for subscription in due {
            if deferred {
                self.jobs
                    .enqueue(BillingJob::CycleSubscription {
                        subscription_id: subscription.id,
                    })
                    .await?;
                summary.enqueued += 1;
                continue;
            }

            match self
                .cycle_billing_period(subscription.id, ChargeMode::Synchronous)
                .await
            {
                Ok(_) => summary.cycled += 1,
                Err(e) => {
                    error!(
                        subscription_id = %subscription.id,
                        error = %e,
                        "Subscription failed to cycle"
                    );
                    summary.failed += 1;
                }
            }
        }

        info!(
            due = summary.due,
            cycled = summary.cycled,
            enqueued = summary.enqueued,
            failed = summary.failed,
            "Cycle sweep finished"
        );
        Ok(summary)
    }

    async fn open_invoice_of(&self, owner: &OwnerProfile) -> AppResult<Invoice> {
        self.invoice_repo
            .get_open_for_owner(owner.id)
            .await?
            .ok_or_else(|| {
                AppError::Consistency(format!("Owner {} has no open invoice", owner.id))
            })
    }

    /// Ends a subscription's billing without opening a period: bills whatever the open
    /// invoice has accrued and opens a fresh one.
    async fn close_out(
        &self,
        subscription: Subscription,
        closed_period: Option<SubscriptionPeriod>,
        owner: &OwnerProfile,
        applied: &[StatusTransition],
        mode: ChargeMode,
    ) -> AppResult<(Subscription, Invoice)> {
        let now = self.clock.now();
        let mut billed_invoice = self.open_invoice_of(owner).await?;
        let items = self.invoice_repo.list_items(billed_invoice.id).await?.len();
        billed_invoice.mark_ready_for_payment(items, now);
        let fresh_invoice = new_open_invoice(self.invoice_repo.as_ref(), owner, now).await?;

        let committed = self
            .ledger
            .commit_cycle(&CycleCommit {
                subscription,
                closed_period,
                opened_period: None,
                billed_invoice,
                fresh_invoice,
            })
            .await?;

        info!(
            subscription_id = %committed.subscription.id,
            status = %committed.subscription.status,
            invoice_id = %committed.billed_invoice.id,
            "Subscription billing closed out"
        );
        for transition in applied {
            notify_transition(self.hooks.as_ref(), *transition, &committed.subscription).await;
        }

        let billed_invoice = self
            .invoices
            .trigger_payment(committed.billed_invoice, mode)
            .await?;
        Ok((committed.subscription, billed_invoice))
    }
}
