use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    adapters::http::{app_state::AppState, routes::ModeQuery},
    app_error::{AppError, AppResult},
    domain::entities::{
        billing_interval::BillingInterval, subscription::Subscription,
        subscription_period::SubscriptionPeriod, subscription_plan::SubscriptionPlan,
        subscription_status::StatusTransition,
    },
    use_cases::{invoice::ChargeMode, subscription::CreateSubscriptionInput},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(subscribe))
        .route("/{id}", get(get_subscription))
        .route("/{id}/cycle", post(cycle))
        .route("/{id}/transitions", post(transition))
        .route("/{id}/plan", post(change_plan))
        .route("/{id}/plan-preview", get(plan_preview))
}

#[derive(Debug, Deserialize)]
struct SubscribeRequest {
    owner_id: Uuid,
    /// Subscribe at catalog terms. Otherwise `interval` and `amount_cents` apply.
    plan_id: Option<Uuid>,
    #[serde(default)]
    interval: BillingInterval,
    amount_cents: Option<i64>,
    #[serde(default)]
    trialing: bool,
    next_bill_date: Option<DateTime<Utc>>,
    #[serde(default)]
    charge_mode: ChargeMode,
}

async fn subscribe(
    State(app_state): State<AppState>,
    Json(payload): Json<SubscribeRequest>,
) -> AppResult<impl IntoResponse> {
    let outcome = match payload.plan_id {
        Some(plan_id) => {
            app_state
                .cycles
                .subscribe_to_plan(payload.owner_id, plan_id, payload.trialing, payload.charge_mode)
                .await?
        }
        None => {
            let amount_cents = payload.amount_cents.ok_or_else(|| {
                AppError::InvalidInput("Either plan_id or amount_cents is required".into())
            })?;
            let input = CreateSubscriptionInput {
                owner_id: payload.owner_id,
                interval: payload.interval,
                amount_cents,
                trialing: payload.trialing,
                next_bill_date: payload.next_bill_date,
            };
            app_state.cycles.subscribe(input, payload.charge_mode).await?
        }
    };

    Ok((StatusCode::CREATED, Json(outcome)))
}

#[derive(Serialize)]
struct SubscriptionResponse {
    subscription: Subscription,
    /// `None` when the subscription is on custom pricing.
    current_plan: Option<SubscriptionPlan>,
    periods: Vec<SubscriptionPeriod>,
}

async fn get_subscription(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let subscription = app_state.subscriptions.get(id).await?;
    let current_plan = app_state.plans.current_plan(&subscription).await?;
    let periods = app_state.subscriptions.list_periods(id).await?;

    Ok(Json(SubscriptionResponse {
        subscription,
        current_plan,
        periods,
    }))
}

async fn cycle(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ModeQuery>,
) -> AppResult<impl IntoResponse> {
    let outcome = app_state.cycles.cycle_billing_period(id, query.mode).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
struct TransitionRequest {
    transition: StatusTransition,
}

async fn transition(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> AppResult<impl IntoResponse> {
    let subscription = app_state
        .subscriptions
        .transition(id, payload.transition)
        .await?;
    Ok(Json(subscription))
}

#[derive(Debug, Deserialize)]
struct ChangePlanRequest {
    plan_id: Uuid,
    #[serde(default)]
    charge_mode: ChargeMode,
}

async fn change_plan(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ChangePlanRequest>,
) -> AppResult<impl IntoResponse> {
    let outcome = app_state
        .plans
        .change_plan(id, payload.plan_id, payload.charge_mode)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
struct PreviewQuery {
    plan_id: Uuid,
}

async fn plan_preview(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<PreviewQuery>,
) -> AppResult<impl IntoResponse> {
    let preview = app_state.plans.preview_change(id, query.plan_id).await?;
    Ok(Json(preview))
}
