use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
};

use crate::{adapters::http::app_state::AppState, app_error::AppResult};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_plans))
        .route("/{code}", get(get_plan))
}

async fn list_plans(State(app_state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(app_state.plans.list_plans().await?))
}

async fn get_plan(
    State(app_state): State<AppState>,
    Path(code): Path<String>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(app_state.plans.get_plan_by_code(&code).await?))
}
