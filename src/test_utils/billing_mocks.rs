//! In-memory implementation of every billing repository trait.
//!
//! One `InMemoryBillingStore` backs all repos so multi-row writes can be applied
//! atomically: each write runs against a copy of the state that only replaces the
//! original when the whole write succeeds. The uniqueness rules of the database schema
//! (one open invoice per owner, one open period per subscription, one invoice per item)
//! and the optimistic `lock_version` checks are enforced here as well.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::{
        billing_cycle::{BillingLedgerRepo, CommittedCycle, CycleCommit},
        invoice::InvoiceRepo,
        plan_change::SubscriptionPlanRepo,
        subscription::{SubscriptionPeriodRepo, SubscriptionRepo},
    },
    domain::entities::{
        billing_interval::BillingInterval,
        invoice::{Invoice, InvoiceStatus},
        invoice_item::{ChargeableItem, ChargeableKind, InvoiceItem},
        subscription::Subscription,
        subscription_period::SubscriptionPeriod,
        subscription_plan::SubscriptionPlan,
    },
};

#[derive(Default, Clone)]
struct StoreState {
    subscriptions: HashMap<Uuid, Subscription>,
    periods: HashMap<Uuid, SubscriptionPeriod>,
    invoices: HashMap<Uuid, Invoice>,
    items: Vec<InvoiceItem>,
    plans: HashMap<Uuid, SubscriptionPlan>,
    invoice_saves: usize,
    fail_invoice_saves_after: Option<usize>,
    next_cycle_commit_error: Option<AppError>,
}

impl StoreState {
    fn insert_subscription(&mut self, subscription: &Subscription) -> AppResult<Subscription> {
        if self
            .subscriptions
            .values()
            .any(|s| s.owner_id == subscription.owner_id)
        {
            return Err(AppError::InvalidInput(
                "Owner already has a subscription".into(),
            ));
        }
        self.subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(subscription.clone())
    }

    fn save_subscription(&mut self, subscription: &Subscription) -> AppResult<Subscription> {
        let stored = self
            .subscriptions
            .get(&subscription.id)
            .ok_or(AppError::NotFound)?;
        if stored.lock_version != subscription.lock_version {
            return Err(AppError::Conflict(format!(
                "Subscription {} was modified concurrently",
                subscription.id
            )));
        }
        let mut saved = subscription.clone();
        saved.lock_version += 1;
        self.subscriptions.insert(saved.id, saved.clone());
        Ok(saved)
    }

    fn check_single_open_invoice(&self, invoice: &Invoice) -> AppResult<()> {
        if invoice.status == InvoiceStatus::Open
            && self.invoices.values().any(|other| {
                other.owner_id == invoice.owner_id
                    && other.id != invoice.id
                    && other.status == InvoiceStatus::Open
            })
        {
            return Err(AppError::InvalidInput(format!(
                "Owner {} already has an open invoice",
                invoice.owner_id
            )));
        }
        Ok(())
    }

    fn insert_invoice(&mut self, invoice: &Invoice) -> AppResult<Invoice> {
        self.check_single_open_invoice(invoice)?;
        if self.invoices.values().any(|other| other.slug == invoice.slug) {
            return Err(AppError::InvalidInput(format!(
                "Invoice slug {} is taken",
                invoice.slug
            )));
        }
        self.invoices.insert(invoice.id, invoice.clone());
        Ok(invoice.clone())
    }

    fn save_invoice(&mut self, invoice: &Invoice) -> AppResult<Invoice> {
        self.invoice_saves += 1;
        if self
            .fail_invoice_saves_after
            .is_some_and(|limit| self.invoice_saves > limit)
        {
            return Err(AppError::Database("injected invoice write failure".into()));
        }

        let stored = self.invoices.get(&invoice.id).ok_or(AppError::NotFound)?;
        if stored.lock_version != invoice.lock_version {
            return Err(AppError::Conflict(format!(
                "Invoice {} was modified concurrently",
                invoice.slug
            )));
        }
        self.check_single_open_invoice(invoice)?;
        // Mirrors the CHECK constraints on the invoices table.
        if [
            invoice.total_paid_cents,
            invoice.tax_paid_cents,
            invoice.subtotal_refunded_cents,
            invoice.tax_refunded_cents,
        ]
        .iter()
        .any(|cents| *cents < 0)
        {
            return Err(AppError::InvalidInput("A value is out of range".into()));
        }

        let mut saved = invoice.clone();
        saved.lock_version += 1;
        self.invoices.insert(saved.id, saved.clone());
        Ok(saved)
    }

    fn insert_period(&mut self, period: &SubscriptionPeriod) -> AppResult<()> {
        if period.is_open()
            && self
                .periods
                .values()
                .any(|p| p.subscription_id == period.subscription_id && p.is_open())
        {
            return Err(AppError::InvalidInput(format!(
                "Subscription {} already has an open period",
                period.subscription_id
            )));
        }
        self.periods.insert(period.id, period.clone());
        Ok(())
    }

    fn close_period(&mut self, period: &SubscriptionPeriod) -> AppResult<()> {
        match self.periods.get(&period.id) {
            Some(stored) if stored.is_open() => {
                self.periods.insert(period.id, period.clone());
                Ok(())
            }
            _ => Err(AppError::Conflict(format!(
                "Period {} is no longer open",
                period.id
            ))),
        }
    }

    fn link_item(&mut self, item: &InvoiceItem) -> AppResult<InvoiceItem> {
        match self.invoices.get(&item.invoice_id) {
            Some(invoice) if invoice.status == InvoiceStatus::Open => {}
            Some(_) => {
                return Err(AppError::InvalidState(
                    "Items can only be added to an open invoice".into(),
                ));
            }
            None => return Err(AppError::NotFound),
        }
        if self
            .items
            .iter()
            .any(|i| i.item_type == item.item_type && i.item_id == item.item_id)
        {
            return Err(AppError::InvalidInput(format!(
                "Item {} is already on an invoice",
                item.item_id
            )));
        }
        self.items.push(item.clone());
        Ok(item.clone())
    }
}

#[derive(Default)]
pub struct InMemoryBillingStore {
    state: Mutex<StoreState>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `write` against a copy of the state, keeping the result only on success.
    fn transaction<T>(&self, write: impl FnOnce(&mut StoreState) -> AppResult<T>) -> AppResult<T> {
        let mut state = self.state.lock().unwrap();
        let mut draft = state.clone();
        let out = write(&mut draft)?;
        *state = draft;
        Ok(out)
    }

    // ------------------------------------------------------------------------
    // Seeding and inspection
    // ------------------------------------------------------------------------

    pub fn insert_subscription(&self, subscription: Subscription) {
        self.transaction(|s| s.insert_subscription(&subscription))
            .unwrap();
    }

    pub fn insert_invoice(&self, invoice: Invoice) {
        self.transaction(|s| s.insert_invoice(&invoice)).unwrap();
    }

    pub fn insert_period(&self, period: SubscriptionPeriod) {
        self.transaction(|s| s.insert_period(&period)).unwrap();
    }

    pub fn insert_plan(&self, plan: SubscriptionPlan) {
        self.state.lock().unwrap().plans.insert(plan.id, plan);
    }

    /// Links an item regardless of the invoice's status.
    pub fn insert_item(&self, invoice_id: Uuid, period: &SubscriptionPeriod) {
        let item = ChargeableItem::SubscriptionPeriod(period.clone());
        self.state
            .lock()
            .unwrap()
            .items
            .push(InvoiceItem::link(invoice_id, &item, period.created_at));
    }

    pub fn subscription(&self, id: Uuid) -> Subscription {
        self.state.lock().unwrap().subscriptions[&id].clone()
    }

    pub fn invoice(&self, id: Uuid) -> Invoice {
        self.state.lock().unwrap().invoices[&id].clone()
    }

    pub fn period(&self, id: Uuid) -> SubscriptionPeriod {
        self.state.lock().unwrap().periods[&id].clone()
    }

    pub fn open_invoice(&self, owner_id: Uuid) -> Option<Invoice> {
        self.invoices_for(owner_id, Some(InvoiceStatus::Open))
            .into_iter()
            .next()
    }

    pub fn invoices_for(&self, owner_id: Uuid, status: Option<InvoiceStatus>) -> Vec<Invoice> {
        let mut invoices: Vec<Invoice> = self
            .state
            .lock()
            .unwrap()
            .invoices
            .values()
            .filter(|i| i.owner_id == owner_id && status.is_none_or(|s| i.status == s))
            .cloned()
            .collect();
        invoices.sort_by_key(|i| i.id);
        invoices
    }

    pub fn open_periods(&self, subscription_id: Uuid) -> Vec<SubscriptionPeriod> {
        self.state
            .lock()
            .unwrap()
            .periods
            .values()
            .filter(|p| p.subscription_id == subscription_id && p.is_open())
            .cloned()
            .collect()
    }

    /// Ids of the items linked to an invoice.
    pub fn items_of(&self, invoice_id: Uuid) -> Vec<Uuid> {
        self.state
            .lock()
            .unwrap()
            .items
            .iter()
            .filter(|i| i.invoice_id == invoice_id)
            .map(|i| i.item_id)
            .collect()
    }

    /// Edits a stored invoice in place, bypassing version checks.
    pub fn update_invoice(&self, id: Uuid, edit: impl FnOnce(&mut Invoice)) {
        let mut state = self.state.lock().unwrap();
        let invoice = state.invoices.get_mut(&id).unwrap();
        edit(invoice);
    }

    /// Lets the next `allowed` invoice saves through, then fails every later one.
    pub fn fail_invoice_saves_after(&self, allowed: usize) {
        let mut state = self.state.lock().unwrap();
        state.invoice_saves = 0;
        state.fail_invoice_saves_after = Some(allowed);
    }

    pub fn fail_next_cycle_commit(&self, error: AppError) {
        self.state.lock().unwrap().next_cycle_commit_error = Some(error);
    }
}

// ============================================================================
// SubscriptionRepo / SubscriptionPeriodRepo
// ============================================================================

#[async_trait]
impl SubscriptionRepo for InMemoryBillingStore {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Subscription>> {
        Ok(self.state.lock().unwrap().subscriptions.get(&id).cloned())
    }

    async fn get_by_owner(&self, owner_id: Uuid) -> AppResult<Option<Subscription>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .subscriptions
            .values()
            .find(|s| s.owner_id == owner_id)
            .cloned())
    }

    async fn list_ready_to_cycle(&self, now: DateTime<Utc>) -> AppResult<Vec<Subscription>> {
        let mut due: Vec<Subscription> = self
            .state
            .lock()
            .unwrap()
            .subscriptions
            .values()
            .filter(|s| s.status.is_cycleable() && s.next_bill_date < now)
            .cloned()
            .collect();
        due.sort_by_key(|s| s.next_bill_date);
        Ok(due)
    }

    async fn save(&self, subscription: &Subscription) -> AppResult<Subscription> {
        self.transaction(|s| s.save_subscription(subscription))
    }
}

#[async_trait]
impl SubscriptionPeriodRepo for InMemoryBillingStore {
    async fn get_current(&self, subscription_id: Uuid) -> AppResult<Option<SubscriptionPeriod>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .periods
            .values()
            .find(|p| p.subscription_id == subscription_id && p.is_open())
            .cloned())
    }

    async fn count_for_subscription(&self, subscription_id: Uuid) -> AppResult<i64> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .periods
            .values()
            .filter(|p| p.subscription_id == subscription_id)
            .count() as i64)
    }

    async fn list_for_subscription(
        &self,
        subscription_id: Uuid,
    ) -> AppResult<Vec<SubscriptionPeriod>> {
        let mut periods: Vec<SubscriptionPeriod> = self
            .state
            .lock()
            .unwrap()
            .periods
            .values()
            .filter(|p| p.subscription_id == subscription_id)
            .cloned()
            .collect();
        periods.sort_by(|a, b| b.start_at.cmp(&a.start_at));
        Ok(periods)
    }
}

// ============================================================================
// InvoiceRepo
// ============================================================================

#[async_trait]
impl InvoiceRepo for InMemoryBillingStore {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Invoice>> {
        Ok(self.state.lock().unwrap().invoices.get(&id).cloned())
    }

    async fn get_open_for_owner(&self, owner_id: Uuid) -> AppResult<Option<Invoice>> {
        Ok(self.open_invoice(owner_id))
    }

    async fn list_for_owner(
        &self,
        owner_id: Uuid,
        status: Option<InvoiceStatus>,
    ) -> AppResult<Vec<Invoice>> {
        Ok(self.invoices_for(owner_id, status))
    }

    async fn count_for_owner(
        &self,
        owner_id: Uuid,
        status: Option<InvoiceStatus>,
    ) -> AppResult<i64> {
        Ok(self.invoices_for(owner_id, status).len() as i64)
    }

    async fn list_retryable(&self, max_failed_attempts: i32) -> AppResult<Vec<Invoice>> {
        let mut invoices: Vec<Invoice> = self
            .state
            .lock()
            .unwrap()
            .invoices
            .values()
            .filter(|i| {
                i.status == InvoiceStatus::ReadyForPayment
                    && i.failed_payment_attempt_count < max_failed_attempts
            })
            .cloned()
            .collect();
        invoices.sort_by_key(|i| i.id);
        Ok(invoices)
    }

    async fn list_items(&self, invoice_id: Uuid) -> AppResult<Vec<ChargeableItem>> {
        let state = self.state.lock().unwrap();
        state
            .items
            .iter()
            .filter(|i| i.invoice_id == invoice_id)
            .map(|i| match i.item_type {
                ChargeableKind::SubscriptionPeriod => state
                    .periods
                    .get(&i.item_id)
                    .cloned()
                    .map(ChargeableItem::SubscriptionPeriod)
                    .ok_or_else(|| {
                        AppError::Consistency(format!("Item {} has no period", i.item_id))
                    }),
            })
            .collect()
    }

    async fn add_item(&self, item: &InvoiceItem) -> AppResult<InvoiceItem> {
        self.transaction(|s| s.link_item(item))
    }

    async fn save(&self, invoice: &Invoice) -> AppResult<Invoice> {
        self.transaction(|s| s.save_invoice(invoice))
    }

    async fn cancel_ready_for_payment(&self, owner_id: Uuid, now: DateTime<Utc>) -> AppResult<u64> {
        let mut state = self.state.lock().unwrap();
        let mut cancelled = 0;
        for invoice in state.invoices.values_mut().filter(|i| {
            i.owner_id == owner_id && i.status == InvoiceStatus::ReadyForPayment
        }) {
            invoice.status = InvoiceStatus::Cancelled;
            invoice.lock_version += 1;
            invoice.updated_at = now;
            cancelled += 1;
        }
        Ok(cancelled)
    }

    async fn earliest_paid_at(&self, owner_id: Uuid) -> AppResult<Option<DateTime<Utc>>> {
        Ok(self
            .invoices_for(owner_id, Some(InvoiceStatus::Paid))
            .iter()
            .filter(|i| i.total_paid_cents > 0)
            .filter_map(|i| i.paid_at)
            .min())
    }
}

// ============================================================================
// SubscriptionPlanRepo
// ============================================================================

#[async_trait]
impl SubscriptionPlanRepo for InMemoryBillingStore {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<SubscriptionPlan>> {
        Ok(self.state.lock().unwrap().plans.get(&id).cloned())
    }

    async fn get_by_code(&self, code: &str) -> AppResult<Option<SubscriptionPlan>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .plans
            .values()
            .find(|p| p.code == code)
            .cloned())
    }

    async fn find_visible_by_terms(
        &self,
        interval: BillingInterval,
        amount_cents: i64,
    ) -> AppResult<Option<SubscriptionPlan>> {
        Ok(self
            .list_visible()
            .await?
            .into_iter()
            .find(|p| p.interval == interval && p.amount_cents == amount_cents))
    }

    async fn list_visible(&self) -> AppResult<Vec<SubscriptionPlan>> {
        let mut plans: Vec<SubscriptionPlan> = self
            .state
            .lock()
            .unwrap()
            .plans
            .values()
            .filter(|p| p.visible)
            .cloned()
            .collect();
        plans.sort_by_key(|p| (p.position, p.id));
        Ok(plans)
    }
}

// ============================================================================
// BillingLedgerRepo
// ============================================================================

#[async_trait]
impl BillingLedgerRepo for InMemoryBillingStore {
    async fn open_subscription(
        &self,
        subscription: &Subscription,
        invoice: &Invoice,
    ) -> AppResult<Subscription> {
        self.transaction(|s| {
            let created = s.insert_subscription(subscription)?;
            let has_open = s.invoices.values().any(|i| {
                i.owner_id == invoice.owner_id && i.status == InvoiceStatus::Open
            });
            if !has_open {
                s.insert_invoice(invoice)?;
            }
            Ok(created)
        })
    }

    async fn commit_cycle(&self, commit: &CycleCommit) -> AppResult<CommittedCycle> {
        if let Some(error) = self.state.lock().unwrap().next_cycle_commit_error.take() {
            return Err(error);
        }

        self.transaction(|s| {
            let subscription = s.save_subscription(&commit.subscription)?;
            if let Some(closed) = &commit.closed_period {
                s.close_period(closed)?;
            }
            if let Some(opened) = &commit.opened_period {
                s.insert_period(opened)?;
            }

            // The item goes on while the invoice is still open.
            let billed = &commit.billed_invoice;
            if let Some(opened) = &commit.opened_period {
                let stored = s
                    .invoices
                    .get(&billed.id)
                    .ok_or(AppError::NotFound)?
                    .clone();
                let item = ChargeableItem::SubscriptionPeriod(opened.clone());
                if stored.status != InvoiceStatus::Open {
                    return Err(AppError::Conflict(format!(
                        "Invoice {} is no longer open",
                        stored.slug
                    )));
                }
                s.link_item(&InvoiceItem::link(billed.id, &item, opened.created_at))?;
            }
            let billed_invoice = s.save_invoice(billed)?;
            let fresh_invoice = s.insert_invoice(&commit.fresh_invoice)?;

            Ok(CommittedCycle {
                subscription,
                billed_invoice,
                fresh_invoice,
            })
        })
    }

    async fn rotate_open_invoice(&self, closing: &Invoice, fresh: &Invoice) -> AppResult<Invoice> {
        self.transaction(|s| {
            let closed = s.save_invoice(closing)?;
            s.insert_invoice(fresh)?;
            Ok(closed)
        })
    }

    async fn cancel_for_payment_failure(
        &self,
        subscription: &Subscription,
    ) -> AppResult<(Subscription, u64)> {
        self.transaction(|s| {
            let saved = s.save_subscription(subscription)?;
            let mut cancelled = 0;
            for invoice in s.invoices.values_mut().filter(|i| {
                i.owner_id == subscription.owner_id && i.status == InvoiceStatus::ReadyForPayment
            }) {
                invoice.status = InvoiceStatus::Cancelled;
                invoice.lock_version += 1;
                invoice.updated_at = subscription.updated_at;
                cancelled += 1;
            }
            Ok((saved, cancelled))
        })
    }
}
