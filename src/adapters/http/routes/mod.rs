pub mod health;
pub mod invoices;
pub mod owners;
pub mod plans;
pub mod subscriptions;
pub mod sweeps;

use axum::Router;
use serde::Deserialize;

use crate::{adapters::http::app_state::AppState, use_cases::invoice::ChargeMode};

/// Admin routes. Callers are expected to put the admin token check in front.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/subscriptions", subscriptions::router())
        .nest("/invoices", invoices::router())
        .nest("/owners", owners::router())
        .nest("/plans", plans::router())
        .nest("/sweeps", sweeps::router())
}

/// `?mode=synchronous|deferred`, defaulting to deferred.
#[derive(Debug, Default, Deserialize)]
pub struct ModeQuery {
    #[serde(default)]
    pub mode: ChargeMode,
}
