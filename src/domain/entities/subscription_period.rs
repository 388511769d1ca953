use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One billed stretch of a subscription. `end_at` is `None` only for the open period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionPeriod {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub amount_cents: i64,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionPeriod {
    pub fn open(
        subscription_id: Uuid,
        amount_cents: i64,
        start_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            subscription_id,
            amount_cents,
            start_at,
            end_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_at.is_none()
    }

    /// Closes the period. Closing is the only change a period ever receives.
    pub fn close(&mut self, end_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.end_at = Some(end_at);
        self.updated_at = now;
    }

    /// Line-item text; open periods run until the subscription's next bill date.
    pub fn describe(&self, next_bill_date: DateTime<Utc>) -> String {
        let end = self.end_at.unwrap_or(next_bill_date);
        format!(
            "Subscription {} to {}",
            self.start_at.format("%B %-d, %Y"),
            end.format("%B %-d, %Y")
        )
    }
}
