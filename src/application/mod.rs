pub mod app_error;
pub mod ports;
pub mod settings;
pub mod use_cases;
