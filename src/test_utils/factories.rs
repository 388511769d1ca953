//! Test data factories for creating valid test fixtures.
//!
//! Each factory function creates a complete, valid object with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use crate::{
    application::ports::owner_directory::OwnerProfile,
    domain::entities::{
        billing_interval::BillingInterval,
        invoice::Invoice,
        subscription::Subscription,
        subscription_period::SubscriptionPeriod,
        subscription_plan::SubscriptionPlan,
        subscription_status::SubscriptionStatus,
    },
};

/// Fixed "now" shared by fixtures and the test clock: 2025-03-15 12:00 UTC.
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap()
}

/// Create a billing owner with a stored customer reference and a valid card.
pub fn create_test_owner(overrides: impl FnOnce(&mut OwnerProfile)) -> OwnerProfile {
    let mut owner = OwnerProfile {
        id: Uuid::now_v7(),
        display_name: "Acme Co".to_string(),
        stripe_customer_id: Some("cus_test".to_string()),
        stripe_token: None,
        has_valid_card_on_file: true,
        tax_exempt: false,
        billing_state: None,
    };
    overrides(&mut owner);
    owner
}

/// Create a monthly $10 subscription in good standing, due at `test_now()`.
pub fn create_test_subscription(
    owner_id: Uuid,
    overrides: impl FnOnce(&mut Subscription),
) -> Subscription {
    let now = test_now();
    let mut subscription = Subscription {
        id: Uuid::now_v7(),
        owner_id,
        status: SubscriptionStatus::GoodStanding,
        interval: BillingInterval::Month,
        amount_cents_base: 1000,
        amount_cents_next_period: 1000,
        next_bill_date: now,
        current_status_at: Some(now - Duration::days(30)),
        first_paid_at: None,
        lock_version: 0,
        created_at: now - Duration::days(30),
        updated_at: now - Duration::days(30),
    };
    overrides(&mut subscription);
    subscription
}

/// Create an open, uncharged invoice.
pub fn create_test_invoice(owner_id: Uuid, overrides: impl FnOnce(&mut Invoice)) -> Invoice {
    let mut invoice = Invoice::open(
        owner_id,
        format!("INV-TEST-{}", Uuid::now_v7().simple()),
        Some("cus_test".to_string()),
        None,
        test_now(),
    );
    overrides(&mut invoice);
    invoice
}

/// Create a visible monthly catalog plan.
pub fn create_test_plan(overrides: impl FnOnce(&mut SubscriptionPlan)) -> SubscriptionPlan {
    let mut plan = SubscriptionPlan {
        id: Uuid::now_v7(),
        group_id: None,
        code: "basic".to_string(),
        name: "Basic".to_string(),
        interval: BillingInterval::Month,
        amount_cents: 1000,
        visible: true,
        position: 0,
        created_at: test_now(),
        updated_at: test_now(),
    };
    overrides(&mut plan);
    plan
}

/// Create an open period that started 30 days ago.
pub fn create_test_period(
    subscription_id: Uuid,
    overrides: impl FnOnce(&mut SubscriptionPeriod),
) -> SubscriptionPeriod {
    let mut period =
        SubscriptionPeriod::open(subscription_id, 1000, test_now() - Duration::days(30), test_now());
    overrides(&mut period);
    period
}
