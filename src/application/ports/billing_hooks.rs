//! Extension points around status changes, payments and the billing cycle.
//!
//! Every method has a no-op default. Host applications implement the ones they need
//! (receipts, notifications, entitlement updates) and hand the implementation to the
//! use cases. Status and payment hooks run after the change is persisted; the two
//! `prepare_*` hooks run inside the cycle, before anything is written.

use async_trait::async_trait;

use crate::domain::entities::{
    invoice::Invoice,
    subscription::Subscription,
    subscription_period::SubscriptionPeriod,
    subscription_status::StatusTransition,
};

#[async_trait]
pub trait BillingHooks: Send + Sync {
    async fn status_changed_to_good_standing(&self, _subscription: &Subscription) {}
    async fn status_changed_to_suspended(&self, _subscription: &Subscription) {}
    async fn status_changed_to_cancelled(&self, _subscription: &Subscription) {}
    async fn status_changed_to_cancel_at_end(&self, _subscription: &Subscription) {}
    async fn status_changed_to_suspended_payment_failed(&self, _subscription: &Subscription) {}
    async fn status_changed_to_cancelled_payment_failed(&self, _subscription: &Subscription) {}
    async fn status_changed_to_trialing(&self, _subscription: &Subscription) {}
    async fn status_changed_to_trial_expired(&self, _subscription: &Subscription) {}
    /// The owner took back a pending cancellation.
    async fn status_reinstated(&self, _subscription: &Subscription) {}

    async fn payment_attempt_failed(&self, _invoice: &Invoice) {}
    async fn payment_attempt_successful(&self, _invoice: &Invoice) {}

    /// Last chance to adjust the period about to be opened.
    fn prepare_next_period(
        &self,
        _subscription: &Subscription,
        next: SubscriptionPeriod,
        _previous: Option<&SubscriptionPeriod>,
    ) -> SubscriptionPeriod {
        next
    }

    /// Adjust the subscription after its bill date has been advanced.
    fn prepare_subscription_for_next_period(
        &self,
        _subscription: &mut Subscription,
        _next: &SubscriptionPeriod,
    ) {
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBillingHooks;

impl BillingHooks for NoopBillingHooks {}

/// Routes a completed transition to its named hook.
pub async fn notify_transition(
    hooks: &dyn BillingHooks,
    transition: StatusTransition,
    subscription: &Subscription,
) {
    match transition {
        StatusTransition::CancelAtEnd => hooks.status_changed_to_cancel_at_end(subscription).await,
        StatusTransition::UncancelAtEnd => hooks.status_reinstated(subscription).await,
        StatusTransition::GoodStanding => hooks.status_changed_to_good_standing(subscription).await,
        StatusTransition::Suspended => hooks.status_changed_to_suspended(subscription).await,
        StatusTransition::Cancelled => hooks.status_changed_to_cancelled(subscription).await,
        StatusTransition::SuspendedPaymentFailed => {
            hooks
                .status_changed_to_suspended_payment_failed(subscription)
                .await
        }
        StatusTransition::CancelledPaymentFailed => {
            hooks
                .status_changed_to_cancelled_payment_failed(subscription)
                .await
        }
        StatusTransition::Trialing => hooks.status_changed_to_trialing(subscription).await,
        StatusTransition::TrialExpired => hooks.status_changed_to_trial_expired(subscription).await,
    }
}
