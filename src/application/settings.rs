use std::time::Duration;

use chrono_tz::Tz;

use crate::domain::money::TaxRateTable;

/// Engine configuration, fixed for the lifetime of the use cases that hold it.
#[derive(Debug, Clone)]
pub struct BillingSettings {
    pub currency: String,
    /// Length of a trial period in days.
    pub trial_days: i64,
    /// Zone whose local midnight anchors bill dates.
    pub anchor_tz: Tz,
    /// A due date further in the past than this is a scheduling defect.
    pub max_overdue_days: i64,
    /// Reinstated subscriptions due within this window get pushed out one interval.
    pub unsuspend_window_days: i64,
    /// Failed attempts on one invoice before its subscription is suspended.
    pub suspend_after_failed_attempts: i32,
    pub gateway_timeout: Duration,
    pub tax_rates: TaxRateTable,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            currency: "usd".to_string(),
            trial_days: 7,
            anchor_tz: chrono_tz::America::Chicago,
            max_overdue_days: 14,
            unsuspend_window_days: 7,
            suspend_after_failed_attempts: 2,
            gateway_timeout: Duration::from_secs(30),
            tax_rates: TaxRateTable::default(),
        }
    }
}

impl BillingSettings {
    /// How long a charge claim blocks other attempts before it is considered abandoned.
    pub fn charge_claim_ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.gateway_timeout * 2)
            .unwrap_or_else(|_| chrono::Duration::minutes(5))
    }
}
