use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::{
            billing_hooks::{BillingHooks, notify_transition},
            clock::Clock,
            owner_directory::OwnerDirectory,
        },
        settings::BillingSettings,
        use_cases::{
            billing_cycle::BillingLedgerRepo,
            invoice::{InvoiceRepo, new_open_invoice},
            plan_change::SubscriptionPlanRepo,
        },
    },
    domain::entities::{
        billing_interval::{BillingInterval, billing_anchor},
        subscription::Subscription,
        subscription_period::SubscriptionPeriod,
        subscription_status::{StatusTransition, SubscriptionStatus},
    },
};

// ============================================================================
// Repository Traits
// ============================================================================

#[async_trait]
pub trait SubscriptionRepo: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Subscription>>;
    async fn get_by_owner(&self, owner_id: Uuid) -> AppResult<Option<Subscription>>;
    /// Cycleable subscriptions whose bill date is strictly before `now`.
    async fn list_ready_to_cycle(&self, now: DateTime<Utc>) -> AppResult<Vec<Subscription>>;
    /// Writes every mutable field if `lock_version` still matches, returning the stored row
    /// with the bumped version. A mismatch is `AppError::Conflict`.
    async fn save(&self, subscription: &Subscription) -> AppResult<Subscription>;
}

#[async_trait]
pub trait SubscriptionPeriodRepo: Send + Sync {
    /// The open period (`end_at IS NULL`), if any.
    async fn get_current(&self, subscription_id: Uuid) -> AppResult<Option<SubscriptionPeriod>>;
    async fn count_for_subscription(&self, subscription_id: Uuid) -> AppResult<i64>;
    /// Newest first.
    async fn list_for_subscription(&self, subscription_id: Uuid)
    -> AppResult<Vec<SubscriptionPeriod>>;
}

// ============================================================================
// Input Types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubscriptionInput {
    pub owner_id: Uuid,
    #[serde(default)]
    pub interval: BillingInterval,
    pub amount_cents: i64,
    #[serde(default)]
    pub trialing: bool,
    /// Defaults to the billing anchor.
    pub next_bill_date: Option<DateTime<Utc>>,
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct SubscriptionUseCases {
    subscription_repo: Arc<dyn SubscriptionRepo>,
    period_repo: Arc<dyn SubscriptionPeriodRepo>,
    invoice_repo: Arc<dyn InvoiceRepo>,
    plan_repo: Arc<dyn SubscriptionPlanRepo>,
    ledger: Arc<dyn BillingLedgerRepo>,
    owners: Arc<dyn OwnerDirectory>,
    hooks: Arc<dyn BillingHooks>,
    clock: Arc<dyn Clock>,
    settings: Arc<BillingSettings>,
}

impl SubscriptionUseCases {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        subscription_repo: Arc<dyn SubscriptionRepo>,
        period_repo: Arc<dyn SubscriptionPeriodRepo>,
        invoice_repo: Arc<dyn InvoiceRepo>,
        plan_repo: Arc<dyn SubscriptionPlanRepo>,
        ledger: Arc<dyn BillingLedgerRepo>,
        owners: Arc<dyn OwnerDirectory>,
        hooks: Arc<dyn BillingHooks>,
        clock: Arc<dyn Clock>,
        settings: Arc<BillingSettings>,
    ) -> Self {
        Self {
            subscription_repo,
            period_repo,
            invoice_repo,
            plan_repo,
            ledger,
            owners,
            hooks,
            clock,
            settings,
        }
    }

    pub async fn get(&self, subscription_id: Uuid) -> AppResult<Subscription> {
        self.subscription_repo
            .get_by_id(subscription_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn list_periods(&self, subscription_id: Uuid) -> AppResult<Vec<SubscriptionPeriod>> {
        self.period_repo.list_for_subscription(subscription_id).await
    }

    /// Creates the owner's subscription together with their open invoice.
    pub async fn create(&self, input: CreateSubscriptionInput) -> AppResult<Subscription> {
        if input.amount_cents < 0 {
            return Err(AppError::InvalidInput(
                "Subscription amount cannot be negative".into(),
            ));
        }

        let owner = self
            .owners
            .get_owner(input.owner_id)
            .await?
            .ok_or_else(|| AppError::InvalidInput("Owner not found".into()))?;

        if self
            .subscription_repo
            .get_by_owner(owner.id)
            .await?
            .is_some()
        {
            return Err(AppError::InvalidInput(
                "Owner already has a subscription".into(),
            ));
        }

        let now = self.clock.now();
        let status = if input.trialing {
            SubscriptionStatus::Trialing
        } else {
            SubscriptionStatus::GoodStanding
        };

        let subscription = Subscription {
            id: Uuid::now_v7(),
            owner_id: owner.id,
            status,
            interval: input.interval,
            amount_cents_base: input.amount_cents,
            // A trial's first period is free.
            amount_cents_next_period: if input.trialing { 0 } else { input.amount_cents },
            next_bill_date: input
                .next_bill_date
                .unwrap_or_else(|| billing_anchor(now, self.settings.anchor_tz)),
            current_status_at: Some(now),
            first_paid_at: None,
            lock_version: 0,
            created_at: now,
            updated_at: now,
        };

        let invoice = new_open_invoice(self.invoice_repo.as_ref(), &owner, now).await?;
        let subscription = self.ledger.open_subscription(&subscription, &invoice).await?;

        info!(
            subscription_id = %subscription.id,
            owner_id = %subscription.owner_id,
            status = %subscription.status,
            "Subscription created"
        );
        Ok(subscription)
    }

    /// Creates a subscription on the terms of a catalog plan.
    pub async fn create_from_plan(
        &self,
        owner_id: Uuid,
        plan_id: Uuid,
        trialing: bool,
    ) -> AppResult<Subscription> {
        let plan = self
            .plan_repo
            .get_by_id(plan_id)
            .await?
            .ok_or_else(|| AppError::InvalidInput("Plan not found".into()))?;

        self.create(CreateSubscriptionInput {
            owner_id,
            interval: plan.interval,
            amount_cents: plan.amount_cents,
            trialing,
            next_bill_date: None,
        })
        .await
    }

    /// Loads the subscription and applies a named transition.
    pub async fn transition(
        &self,
        subscription_id: Uuid,
        transition: StatusTransition,
    ) -> AppResult<Subscription> {
        let subscription = self.get(subscription_id).await?;
        self.apply_transition(subscription, transition).await
    }

    pub async fn cancel_at_end(&self, subscription_id: Uuid) -> AppResult<Subscription> {
        self.transition(subscription_id, StatusTransition::CancelAtEnd)
            .await
    }

    pub async fn uncancel_at_end(&self, subscription_id: Uuid) -> AppResult<Subscription> {
        self.transition(subscription_id, StatusTransition::UncancelAtEnd)
            .await
    }

    /// Checks the precondition, persists the new status and fires the matching hook.
    pub async fn apply_transition(
        &self,
        mut subscription: Subscription,
        transition: StatusTransition,
    ) -> AppResult<Subscription> {
        let now = self.clock.now();
        let from = subscription.status;
        subscription.apply(transition, now)?;

        let saved = if transition == StatusTransition::CancelledPaymentFailed {
            // Forgives whatever the owner still owes.
            let (saved, cancelled) = self.ledger.cancel_for_payment_failure(&subscription).await?;
            info!(
                subscription_id = %saved.id,
                cancelled_invoices = cancelled,
                "Outstanding invoices cancelled"
            );
            saved
        } else {
            self.subscription_repo.save(&subscription).await?
        };

        info!(
            subscription_id = %saved.id,
            from = %from,
            to = %saved.status,
            transition = %transition,
            "Subscription status changed"
        );
        notify_transition(self.hooks.as_ref(), transition, &saved).await;
        Ok(saved)
    }

    /// Returns a subscription suspended for non-payment to good standing. If it was due
    /// within the unsuspend window its bill date is pushed a full interval out, so the
    /// owner is not billed again right away.
    pub async fn unsuspend_for_payment_failed(
        &self,
        mut subscription: Subscription,
    ) -> AppResult<Subscription> {
        if subscription.status == SubscriptionStatus::GoodStanding {
            return Ok(subscription);
        }

        let now = self.clock.now();
        if subscription.next_bill_date <= now + Duration::days(self.settings.unsuspend_window_days)
        {
            subscription.next_bill_date =
                subscription.interval.advance(now).ok_or_else(|| {
                    AppError::Consistency(format!(
                        "Bill date for subscription {} is out of range",
                        subscription.id
                    ))
                })?;
        }

        self.apply_transition(subscription, StatusTransition::GoodStanding)
            .await
    }

    /// Stamps `first_paid_at` from the owner's earliest non-zero paid invoice.
    pub async fn update_first_paid_at(
        &self,
        owner_id: Uuid,
        force: bool,
    ) -> AppResult<Option<Subscription>> {
        let Some(mut subscription) = self.subscription_repo.get_by_owner(owner_id).await? else {
            return Ok(None);
        };
        if !force && subscription.first_paid_at.is_some() {
            return Ok(Some(subscription));
        }

        let first_paid_at = self.invoice_repo.earliest_paid_at(owner_id).await?;
        if first_paid_at == subscription.first_paid_at {
            return Ok(Some(subscription));
        }
        subscription.first_paid_at = first_paid_at;
        Ok(Some(self.subscription_repo.save(&subscription).await?))
    }
}
