pub mod billing_cycle;
pub mod invoice;
pub mod plan_change;
pub mod subscription;
