use std::sync::Arc;

use crate::{
    infra::config::AppConfig,
    use_cases::{
        billing_cycle::BillingCycleUseCases, invoice::InvoiceUseCases,
        plan_change::PlanChangeUseCases, subscription::SubscriptionUseCases,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub subscriptions: Arc<SubscriptionUseCases>,
    pub invoices: Arc<InvoiceUseCases>,
    pub cycles: Arc<BillingCycleUseCases>,
    pub plans: Arc<PlanChangeUseCases>,
}
