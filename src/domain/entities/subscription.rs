use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::{
    billing_interval::BillingInterval,
    subscription_plan::SubscriptionPlan,
    subscription_status::{StatusTransition, SubscriptionStatus},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub status: SubscriptionStatus,
    pub interval: BillingInterval,
    /// Steady-state price of one period.
    pub amount_cents_base: i64,
    /// Price of the next period only. Reverts to the base once a period is opened.
    pub amount_cents_next_period: i64,
    pub next_bill_date: DateTime<Utc>,
    pub current_status_at: Option<DateTime<Utc>>,
    pub first_paid_at: Option<DateTime<Utc>>,
    pub lock_version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Cannot apply '{transition}' to a subscription in '{from}'")]
pub struct InvalidTransition {
    pub transition: StatusTransition,
    pub from: SubscriptionStatus,
}

impl Subscription {
    /// Applies a named status change, stamping `current_status_at` when the status moves.
    pub fn apply(
        &mut self,
        transition: StatusTransition,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        if !transition.permits(self.status) {
            return Err(InvalidTransition {
                transition,
                from: self.status,
            });
        }

        match transition {
            StatusTransition::CancelAtEnd => self.amount_cents_next_period = 0,
            StatusTransition::UncancelAtEnd => {
                self.amount_cents_next_period = self.amount_cents_base
            }
            _ => {}
        }

        let target = transition.target();
        if self.status != target {
            self.status = target;
            self.current_status_at = Some(now);
        }
        Ok(())
    }

    /// Takes over interval and price from a catalog plan, staging the plan price for the next period.
    pub fn adopt_plan(&mut self, plan: &SubscriptionPlan) {
        self.interval = plan.interval;
        self.amount_cents_base = plan.amount_cents;
        self.amount_cents_next_period = plan.amount_cents;
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_bill_date <= now
    }
}
