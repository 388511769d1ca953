use axum::{Router, http, middleware};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::{
    adapters::{
        self,
        http::{app_state::AppState, middleware::require_admin_token},
    },
    infra::setup::init_tracing,
};

pub fn create_app(app_state: AppState) -> Router {
    init_tracing();

    build_router(app_state).layer(ServiceBuilder::new().layer(
        TraceLayer::new_for_http().make_span_with(|request: &http::Request<_>| {
            let request_id = Uuid::new_v4();
            tracing::info_span!(
                "http-request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version(),
                request_id = %request_id
            )
        }),
    ))
}

/// `/api/health` is open; everything else under `/api` needs the admin token.
pub fn build_router(app_state: AppState) -> Router {
    let api = adapters::http::routes::router()
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            require_admin_token,
        ))
        .merge(adapters::http::routes::health::router());

    Router::new().nest("/api", api).with_state(app_state)
}
