use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    app_error::AppResult,
    domain::entities::{invoice::Invoice, invoice_item::ChargeableItem},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(get_invoice))
        .route("/{id}/charge", post(charge))
        .route("/{id}/refund", post(refund))
        .route("/{id}/refund-tax", post(refund_tax))
}

#[derive(Serialize)]
struct InvoiceResponse {
    #[serde(flatten)]
    invoice: Invoice,
    subtotal_paid_cents: i64,
    amount_refunded_cents: i64,
    items: Vec<ChargeableItem>,
}

async fn get_invoice(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let invoice = app_state.invoices.get(id).await?;
    let items = app_state.invoices.list_items(id).await?;

    Ok(Json(InvoiceResponse {
        subtotal_paid_cents: invoice.subtotal_paid_cents(),
        amount_refunded_cents: invoice.amount_refunded_cents(),
        invoice,
        items,
    }))
}

async fn charge(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let invoice = app_state.invoices.charge(id).await?;
    Ok(Json(invoice))
}

async fn refund(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let invoice = app_state.invoices.refund(id).await?;
    Ok(Json(invoice))
}

#[derive(Serialize)]
struct RefundTaxResponse {
    /// False when the invoice carried no tax.
    refunded: bool,
    invoice: Invoice,
}

async fn refund_tax(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let response = match app_state.invoices.refund_tax(id).await? {
        Some(invoice) => RefundTaxResponse {
            refunded: true,
            invoice,
        },
        None => RefundTaxResponse {
            refunded: false,
            invoice: app_state.invoices.get(id).await?,
        },
    };
    Ok(Json(response))
}
