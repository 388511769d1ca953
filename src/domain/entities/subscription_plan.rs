use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::{billing_interval::BillingInterval, subscription::Subscription};

/// Read-only catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionPlan {
    pub id: Uuid,
    pub group_id: Option<Uuid>,
    pub code: String,
    pub name: String,
    pub interval: BillingInterval,
    pub amount_cents: i64,
    pub visible: bool,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionPlan {
    /// e.g. "$10.00/mo"
    pub fn price_label(&self) -> String {
        format!(
            "${}.{:02}/{}",
            self.amount_cents / 100,
            self.amount_cents % 100,
            self.interval.short_label()
        )
    }
}

/// Price and interval of whatever a subscription is on, catalog plan or custom pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanTerms {
    pub group_id: Option<Uuid>,
    pub interval: BillingInterval,
    pub amount_cents: i64,
}

impl PlanTerms {
    /// Price normalised to one month, used to rank plans of different intervals.
    pub fn per_month_value(&self) -> Decimal {
        Decimal::from(self.amount_cents) / Decimal::from(self.interval.months())
    }

    /// Same tier: both in one catalog group, or equal monthly value.
    pub fn same_value_as(&self, other: &PlanTerms) -> bool {
        match (self.group_id, other.group_id) {
            (Some(a), Some(b)) if a == b => true,
            _ => self.per_month_value() == other.per_month_value(),
        }
    }

    pub fn is_more_valuable_than(&self, other: &PlanTerms) -> bool {
        self.per_month_value() > other.per_month_value()
    }
}

impl From<&SubscriptionPlan> for PlanTerms {
    fn from(plan: &SubscriptionPlan) -> Self {
        Self {
            group_id: plan.group_id,
            interval: plan.interval,
            amount_cents: plan.amount_cents,
        }
    }
}

impl From<&Subscription> for PlanTerms {
    fn from(sub: &Subscription) -> Self {
        Self {
            group_id: None,
            interval: sub.interval,
            amount_cents: sub.amount_cents_base,
        }
    }
}
