use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::clock::Clock,
        settings::BillingSettings,
        use_cases::{
            billing_cycle::{BillingCycleUseCases, CycleOutcome},
            invoice::ChargeMode,
            subscription::{SubscriptionPeriodRepo, SubscriptionRepo, SubscriptionUseCases},
        },
    },
    domain::{
        entities::{
            billing_interval::{BillingInterval, billing_anchor},
            subscription::Subscription,
            subscription_plan::{PlanTerms, SubscriptionPlan},
            subscription_status::{StatusTransition, SubscriptionStatus},
        },
        money::{prorate_cents, rounded_days},
    },
};

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait SubscriptionPlanRepo: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<SubscriptionPlan>>;
    async fn get_by_code(&self, code: &str) -> AppResult<Option<SubscriptionPlan>>;
    /// The visible plan with exactly these terms, if the catalog has one.
    async fn find_visible_by_terms(
        &self,
        interval: BillingInterval,
        amount_cents: i64,
    ) -> AppResult<Option<SubscriptionPlan>>;
    /// Ordered by position.
    async fn list_visible(&self) -> AppResult<Vec<SubscriptionPlan>>;
}

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanChangeKind {
    /// Switch during a trial; nothing is billed.
    TrialSwitch,
    /// Restart of a lapsed subscription on the new plan, billed now.
    Reactivation,
    /// Same tier, different interval. Applies from the next cycle.
    IntervalChange,
    /// Higher monthly value. Billed now with credit for the unused period.
    Upgrade,
    /// Equal or lower monthly value. Applies from the next cycle.
    Downgrade,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanChangePreview {
    pub kind: PlanChangeKind,
    pub current_plan: Option<SubscriptionPlan>,
    pub target_plan: SubscriptionPlan,
    /// Credit for the unused part of the current period.
    pub value_remaining_cents: i64,
    /// Price of the next period after the change.
    pub next_period_amount_cents: i64,
    /// When the new price is first billed.
    pub bills_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum PlanChangeOutcome {
    TrialSwitch {
        subscription: Subscription,
    },
    Reactivated {
        cycle: CycleOutcome,
    },
    IntervalChanged {
        subscription: Subscription,
    },
    Upgraded {
        value_remaining_cents: i64,
        staged_amount_cents: i64,
        cycle: CycleOutcome,
    },
    Downgraded {
        subscription: Subscription,
    },
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct PlanChangeUseCases {
    plan_repo: Arc<dyn SubscriptionPlanRepo>,
    subscription_repo: Arc<dyn SubscriptionRepo>,
    period_repo: Arc<dyn SubscriptionPeriodRepo>,
    subscriptions: Arc<SubscriptionUseCases>,
    cycles: Arc<BillingCycleUseCases>,
    clock: Arc<dyn Clock>,
    settings: Arc<BillingSettings>,
}

impl PlanChangeUseCases {
    pub fn new(
        plan_repo: Arc<dyn SubscriptionPlanRepo>,
        subscription_repo: Arc<dyn SubscriptionRepo>,
        period_repo: Arc<dyn SubscriptionPeriodRepo>,
        subscriptions: Arc<SubscriptionUseCases>,
        cycles: Arc<BillingCycleUseCases>,
        clock: Arc<dyn Clock>,
        settings: Arc<BillingSettings>,
    ) -> Self {
        Self {
            plan_repo,
            subscription_repo,
            period_repo,
            subscriptions,
            cycles,
            clock,
            settings,
        }
    }

    pub async fn list_plans(&self) -> AppResult<Vec<SubscriptionPlan>> {
        self.plan_repo.list_visible().await
    }

    pub async fn get_plan_by_code(&self, code: &str) -> AppResult<SubscriptionPlan> {
        self.plan_repo
            .get_by_code(code)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// The catalog plan matching the subscription's terms. `None` means custom pricing.
    pub async fn current_plan(
        &self,
        subscription: &Subscription,
    ) -> AppResult<Option<SubscriptionPlan>> {
        self.plan_repo
            .find_visible_by_terms(subscription.interval, subscription.amount_cents_base)
            .await
    }

    /// Unused value of the current period, in cents of the base price. Zero for
    /// subscriptions that are not active.
    pub async fn value_cents_remaining(&self, subscription: &Subscription) -> AppResult<i64> {
        if !subscription.status.is_active() {
            return Ok(0);
        }
        let period = self
            .period_repo
            .get_current(subscription.id)
            .await?
            .ok_or_else(|| {
                AppError::Consistency(format!(
                    "Subscription {} has no current period",
                    subscription.id
                ))
            })?;

        let now = self.clock.now();
        let days_left = rounded_days((subscription.next_bill_date - now).num_seconds());
        let days_total = rounded_days((subscription.next_bill_date - period.start_at).num_seconds());
        Ok(prorate_cents(
            subscription.amount_cents_base,
            days_left,
            days_total,
        ))
    }

    /// What `change_plan` would do, without doing it.
    pub async fn preview_change(
        &self,
        subscription_id: Uuid,
        plan_id: Uuid,
    ) -> AppResult<PlanChangePreview> {
        let subscription = self.subscriptions.get(subscription_id).await?;
        let target_plan = self.target_plan(plan_id).await?;
        let current_plan = self.current_plan(&subscription).await?;
        let kind = self.classify(&subscription, current_plan.as_ref(), &target_plan)?;
        let now = self.clock.now();
        let anchor = billing_anchor(now, self.settings.anchor_tz);

        let (value_remaining_cents, next_period_amount_cents, bills_at) = match kind {
            PlanChangeKind::Upgrade => {
                let value = self.value_cents_remaining(&subscription).await?;
                (value, target_plan.amount_cents - value, anchor)
            }
            PlanChangeKind::Reactivation => (0, target_plan.amount_cents, anchor),
            PlanChangeKind::TrialSwitch
            | PlanChangeKind::IntervalChange
            | PlanChangeKind::Downgrade => {
                (0, target_plan.amount_cents, subscription.next_bill_date)
            }
        };

        Ok(PlanChangePreview {
            kind,
            current_plan,
            target_plan,
            value_remaining_cents,
            next_period_amount_cents,
            bills_at,
        })
    }

    /// Moves a subscription onto a catalog plan.
    pub async fn change_plan(
        &self,
        subscription_id: Uuid,
        plan_id: Uuid,
        mode: ChargeMode,
    ) -> AppResult<PlanChangeOutcome> {
        let mut subscription = self.subscriptions.get(subscription_id).await?;
        let target_plan = self.target_plan(plan_id).await?;

        // Choosing any plan reinstates the subscription, even when the change is then rejected.
        if subscription.status == SubscriptionStatus::CancelAtEnd {
            subscription = self
                .subscriptions
                .apply_transition(subscription, StatusTransition::UncancelAtEnd)
                .await?;
        }

        let current_plan = self.current_plan(&subscription).await?;
        let kind = self.classify(&subscription, current_plan.as_ref(), &target_plan)?;
        let now = self.clock.now();

        let outcome = match kind {
            PlanChangeKind::TrialSwitch => {
                subscription.adopt_plan(&target_plan);
                subscription.updated_at = now;
                PlanChangeOutcome::TrialSwitch {
                    subscription: self.subscription_repo.save(&subscription).await?,
                }
            }
            PlanChangeKind::Reactivation => {
                subscription.adopt_plan(&target_plan);
                subscription.next_bill_date = billing_anchor(now, self.settings.anchor_tz);
                let reactivated = self
                    .subscriptions
                    .apply_transition(subscription, StatusTransition::GoodStanding)
                    .await?;
                PlanChangeOutcome::Reactivated {
                    cycle: self
                        .cycles
                        .cycle_billing_period(reactivated.id, mode)
                        .await?,
                }
            }
            PlanChangeKind::Upgrade => {
                let value_remaining_cents = self.value_cents_remaining(&subscription).await?;
                subscription.adopt_plan(&target_plan);
                // May go negative; that period is simply free.
                subscription.amount_cents_next_period =
                    target_plan.amount_cents - value_remaining_cents;
                subscription.next_bill_date = billing_anchor(now, self.settings.anchor_tz);
                subscription.updated_at = now;
                let staged = self.subscription_repo.save(&subscription).await?;

                PlanChangeOutcome::Upgraded {
                    value_remaining_cents,
                    staged_amount_cents: staged.amount_cents_next_period,
                    cycle: self.cycles.cycle_billing_period(staged.id, mode).await?,
                }
            }
            PlanChangeKind::IntervalChange | PlanChangeKind::Downgrade => {
                subscription.adopt_plan(&target_plan);
                subscription.updated_at = now;
                let saved = self.subscription_repo.save(&subscription).await?;
                if kind == PlanChangeKind::IntervalChange {
                    PlanChangeOutcome::IntervalChanged {
                        subscription: saved,
                    }
                } else {
                    PlanChangeOutcome::Downgraded {
                        subscription: saved,
                    }
                }
            }
        };

        info!(
            subscription_id = %subscription_id,
            plan = %target_plan.code,
            kind = ?kind,
            "Plan changed"
        );
        Ok(outcome)
    }

    async fn target_plan(&self, plan_id: Uuid) -> AppResult<SubscriptionPlan> {
        self.plan_repo
            .get_by_id(plan_id)
            .await?
            .ok_or_else(|| AppError::InvalidInput("Plan not found".into()))
    }

    fn classify(
        &self,
        subscription: &Subscription,
        current_plan: Option<&SubscriptionPlan>,
        target_plan: &SubscriptionPlan,
    ) -> AppResult<PlanChangeKind> {
        match subscription.status {
            SubscriptionStatus::Trialing => return Ok(PlanChangeKind::TrialSwitch),
            SubscriptionStatus::TrialExpired
            | SubscriptionStatus::Cancelled
            | SubscriptionStatus::CancelledPaymentFailed => {
                return Ok(PlanChangeKind::Reactivation);
            }
            _ => {}
        }

        if current_plan.is_some_and(|plan| plan.id == target_plan.id) {
            return Err(AppError::InvalidInput(
                "That's the plan you're currently on!".into(),
            ));
        }
        if target_plan.interval.months() < subscription.interval.months() {
            return Err(AppError::InvalidInput(
                "You cannot change to a shorter interval".into(),
            ));
        }

        let current = current_plan
            .map(PlanTerms::from)
            .unwrap_or_else(|| PlanTerms::from(subscription));
        let target = PlanTerms::from(target_plan);

        if target.same_value_as(&current) {
            Ok(PlanChangeKind::IntervalChange)
        } else if target.is_more_valuable_than(&current) {
            if !matches!(
                subscription.status,
                SubscriptionStatus::GoodStanding | SubscriptionStatus::CancelAtEnd
            ) {
                return Err(AppError::InvalidState(format!(
                    "Cannot upgrade subscription {} while {}",
                    subscription.id, subscription.status
                )));
            }
            Ok(PlanChangeKind::Upgrade)
        } else {
            Ok(PlanChangeKind::Downgrade)
        }
    }
}
