use axum::{
    Json, Router,
    extract::{Query, State},
    response::IntoResponse,
    routing::post,
};
use serde::Deserialize;

use crate::{adapters::http::app_state::AppState, app_error::AppResult};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cycle", post(cycle_sweep))
        .route("/retry", post(retry_sweep))
}

#[derive(Debug, Deserialize)]
struct CycleSweepQuery {
    #[serde(default = "default_deferred")]
    deferred: bool,
}

fn default_deferred() -> bool {
    true
}

async fn cycle_sweep(
    State(app_state): State<AppState>,
    Query(query): Query<CycleSweepQuery>,
) -> AppResult<impl IntoResponse> {
    let summary = app_state
        .cycles
        .cycle_due_subscriptions(query.deferred)
        .await?;
    Ok(Json(summary))
}

async fn retry_sweep(State(app_state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(app_state.invoices.retry_failed_invoices().await?))
}
