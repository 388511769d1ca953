//! Test app state builder for HTTP-level testing.
//!
//! `TestAppStateBuilder` turns a `TestBilling` harness into an `AppState`, so route
//! tests drive the same in-memory store they later inspect.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_test::TestServer;
use secrecy::SecretString;

use crate::{
    adapters::http::app_state::AppState,
    infra::{
        app::build_router,
        config::{AppConfig, GatewayKind},
        stripe_client::STRIPE_API_BASE,
    },
    test_utils::TestBilling,
};

pub const TEST_ADMIN_TOKEN: &str = "test-admin-token";

pub struct TestAppStateBuilder {
    admin_token: String,
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self {
            admin_token: TEST_ADMIN_TOKEN.to_string(),
        }
    }
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_admin_token(mut self, token: &str) -> Self {
        self.admin_token = token.to_string();
        self
    }

    pub fn build(self, billing: &TestBilling) -> AppState {
        let config = AppConfig {
            database_url: "postgres://unused".to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            admin_api_token: SecretString::new(self.admin_token.into()),
            payment_gateway: GatewayKind::Dummy,
            stripe_secret_key: None,
            stripe_api_base: STRIPE_API_BASE.to_string(),
            run_migrations: false,
            cycle_sweep_interval: Duration::from_secs(3600),
            retry_sweep_interval: Duration::from_secs(3600),
            max_concurrent_jobs: 1,
            billing: (*billing.settings).clone(),
        };

        AppState {
            config: Arc::new(config),
            subscriptions: billing.subscriptions.clone(),
            invoices: billing.invoices.clone(),
            cycles: billing.cycles.clone(),
            plans: billing.plans.clone(),
        }
    }
}

/// The full `/api` router over `billing`, with admin auth in place.
pub fn test_router(billing: &TestBilling) -> Router {
    build_router(TestAppStateBuilder::new().build(billing))
}

pub fn test_server(billing: &TestBilling) -> TestServer {
    TestServer::new(test_router(billing)).unwrap()
}

pub fn admin_auth() -> String {
    format!("Bearer {TEST_ADMIN_TOKEN}")
}
