pub mod billing_hooks;
pub mod clock;
pub mod job_queue;
pub mod owner_directory;
pub mod payment_gateway;
