pub mod billing_interval;
pub mod invoice;
pub mod invoice_item;
pub mod payment_scenario;
pub mod subscription;
pub mod subscription_period;
pub mod subscription_plan;
pub mod subscription_status;
