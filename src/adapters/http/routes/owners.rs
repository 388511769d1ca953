use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::post,
};
use uuid::Uuid;

use crate::{adapters::http::app_state::AppState, app_error::AppResult};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{owner_id}/bill-outstanding", post(bill_outstanding))
        .route("/{owner_id}/cancel-outstanding", post(cancel_outstanding))
}

async fn bill_outstanding(
    State(app_state): State<AppState>,
    Path(owner_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let paid = app_state.invoices.bill_outstanding_invoices(owner_id).await?;
    Ok(Json(paid))
}

async fn cancel_outstanding(
    State(app_state): State<AppState>,
    Path(owner_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let cancelled = app_state
        .invoices
        .cancel_outstanding_invoices(owner_id)
        .await?;
    Ok(Json(serde_json::json!({ "cancelled": cancelled })))
}
