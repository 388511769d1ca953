//! Fully wired use cases over in-memory collaborators.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    application::{
        ports::owner_directory::OwnerProfile,
        settings::BillingSettings,
        use_cases::{
            billing_cycle::BillingCycleUseCases, invoice::InvoiceUseCases,
            plan_change::PlanChangeUseCases, subscription::SubscriptionUseCases,
        },
    },
    domain::entities::{
        invoice::{Invoice, InvoicePaymentStatus, InvoiceStatus},
        subscription::Subscription,
        subscription_period::SubscriptionPeriod,
        subscription_plan::SubscriptionPlan,
    },
    test_utils::{
        FixedClock, InMemoryBillingStore, InMemoryOwnerDirectory, RecordingHooks,
        RecordingJobQueue, ScriptedPaymentGateway, create_test_invoice, create_test_owner,
        create_test_period, create_test_plan, create_test_subscription, test_now,
    },
};

pub struct TestBilling {
    pub store: Arc<InMemoryBillingStore>,
    pub owners: Arc<InMemoryOwnerDirectory>,
    pub gateway: Arc<ScriptedPaymentGateway>,
    pub jobs: Arc<RecordingJobQueue>,
    pub hooks: Arc<RecordingHooks>,
    pub clock: Arc<FixedClock>,
    pub settings: Arc<BillingSettings>,
    pub subscriptions: Arc<SubscriptionUseCases>,
    pub invoices: Arc<InvoiceUseCases>,
    pub cycles: Arc<BillingCycleUseCases>,
    pub plans: Arc<PlanChangeUseCases>,
}

impl TestBilling {
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    pub fn with_settings(overrides: impl FnOnce(&mut BillingSettings)) -> Self {
        let mut settings = BillingSettings::default();
        overrides(&mut settings);
        let settings = Arc::new(settings);

        let store = Arc::new(InMemoryBillingStore::new());
        let owners = Arc::new(InMemoryOwnerDirectory::new());
        let gateway = Arc::new(ScriptedPaymentGateway::new());
        let jobs = Arc::new(RecordingJobQueue::new());
        let hooks = Arc::new(RecordingHooks::new());
        let clock = Arc::new(FixedClock::new(test_now()));

        let subscriptions = Arc::new(SubscriptionUseCases::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            owners.clone(),
            hooks.clone(),
            clock.clone(),
            settings.clone(),
        ));
        let invoices = Arc::new(InvoiceUseCases::new(
            store.clone(),
            store.clone(),
            store.clone(),
            subscriptions.clone(),
            owners.clone(),
            gateway.clone(),
            jobs.clone(),
            hooks.clone(),
            clock.clone(),
            settings.clone(),
        ));
        let cycles = Arc::new(BillingCycleUseCases::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            subscriptions.clone(),
            invoices.clone(),
            owners.clone(),
            jobs.clone(),
            hooks.clone(),
            clock.clone(),
            settings.clone(),
        ));
        let plans = Arc::new(PlanChangeUseCases::new(
            store.clone(),
            store.clone(),
            store.clone(),
            subscriptions.clone(),
            cycles.clone(),
            clock.clone(),
            settings.clone(),
        ));

        Self {
            store,
            owners,
            gateway,
            jobs,
            hooks,
            clock,
            settings,
            subscriptions,
            invoices,
            cycles,
            plans,
        }
    }

    pub fn add_owner(&self, owner: OwnerProfile) -> OwnerProfile {
        self.owners.insert(owner.clone());
        owner
    }

    pub fn add_plan(&self, overrides: impl FnOnce(&mut SubscriptionPlan)) -> SubscriptionPlan {
        let plan = create_test_plan(overrides);
        self.store.insert_plan(plan.clone());
        plan
    }

    /// Stores a subscription without an open invoice.
    pub fn add_subscription(
        &self,
        owner_id: Uuid,
        overrides: impl FnOnce(&mut Subscription),
    ) -> Subscription {
        let subscription = create_test_subscription(owner_id, overrides);
        self.store.insert_subscription(subscription.clone());
        subscription
    }

    pub fn add_open_invoice(&self, owner_id: Uuid) -> Invoice {
        let invoice = create_test_invoice(owner_id, |_| {});
        self.store.insert_invoice(invoice.clone());
        invoice
    }

    /// A default owner with a subscription and an empty open invoice.
    pub async fn subscribed_owner(
        &self,
        overrides: impl FnOnce(&mut Subscription),
    ) -> (OwnerProfile, Subscription) {
        let owner = self.add_owner(create_test_owner(|_| {}));
        let subscription = self.add_subscription(owner.id, overrides);
        self.add_open_invoice(owner.id);
        (owner, subscription)
    }

    pub fn add_open_period(
        &self,
        subscription_id: Uuid,
        amount_cents: i64,
        start_at: DateTime<Utc>,
    ) -> SubscriptionPeriod {
        let period = create_test_period(subscription_id, |p| {
            p.amount_cents = amount_cents;
            p.start_at = start_at;
        });
        self.store.insert_period(period.clone());
        period
    }

    pub fn add_closed_period(&self, subscription_id: Uuid, amount_cents: i64) -> SubscriptionPeriod {
        let now = test_now();
        let period = create_test_period(subscription_id, |p| {
            p.amount_cents = amount_cents;
            p.start_at = now - Duration::days(60);
            p.end_at = Some(now - Duration::days(30) - Duration::seconds(1));
        });
        self.store.insert_period(period.clone());
        period
    }

    /// A ready-for-payment invoice billing one closed period of `amount_cents`.
    pub fn add_ready_invoice(&self, owner_id: Uuid, amount_cents: i64) -> Invoice {
        let invoice = create_test_invoice(owner_id, |i| {
            i.status = InvoiceStatus::ReadyForPayment;
        });
        self.store.insert_invoice(invoice.clone());
        let period = self.add_closed_period(Uuid::now_v7(), amount_cents);
        self.store.insert_item(invoice.id, &period);
        invoice
    }

    pub fn add_paid_invoice(
        &self,
        owner_id: Uuid,
        total_cents: i64,
        paid_at: DateTime<Utc>,
    ) -> Invoice {
        let invoice = create_test_invoice(owner_id, |i| {
            i.status = InvoiceStatus::Paid;
            i.payment_status = InvoicePaymentStatus::PaymentSucceeded;
            i.total_paid_cents = total_cents;
            i.paid_at = Some(paid_at);
            i.stripe_charge_id = Some("ch_paid".to_string());
        });
        self.store.insert_invoice(invoice.clone());
        invoice
    }
}

impl Default for TestBilling {
    fn default() -> Self {
        Self::new()
    }
}
