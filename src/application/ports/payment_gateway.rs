use async_trait::async_trait;
use serde::Serialize;

use crate::{app_error::AppResult, domain::entities::invoice::CardDetails};

// ============================================================================
// Port Types
// ============================================================================

/// What the gateway should charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum PaymentSource {
    /// Stored customer reference.
    Customer(String),
    /// One-time card token.
    Token(String),
}

impl PaymentSource {
    /// Customer reference wins over a token when both are on file.
    pub fn select(customer_id: Option<&str>, token: Option<&str>) -> Option<Self> {
        match (customer_id, token) {
            (Some(customer), _) if !customer.is_empty() => {
                Some(PaymentSource::Customer(customer.to_string()))
            }
            (_, Some(token)) if !token.is_empty() => Some(PaymentSource::Token(token.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PaymentSource::Customer(id) | PaymentSource::Token(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    pub amount_cents: i64,
    pub currency: String,
    pub description: String,
    pub source: PaymentSource,
    /// Repeating a request with the same key must not create a second charge.
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeResult {
    pub charge_id: String,
    pub card: CardDetails,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub card_address_state: Option<String>,
}

// ============================================================================
// Port Trait
// ============================================================================

/// External card processor.
///
/// Card errors come back as `AppError::PaymentDeclined`; every other failure as
/// `AppError::PaymentGateway`.
#[async_trait]
pub trait PaymentGatewayPort: Send + Sync {
    async fn charge(&self, request: &ChargeRequest) -> AppResult<ChargeResult>;

    /// Refunds `amount_cents`, or the whole charge when `None`. Returns whether the
    /// gateway accepted the refund.
    async fn refund(&self, charge_id: &str, amount_cents: Option<i64>) -> AppResult<bool>;

    async fn retrieve_charge(&self, charge_id: &str) -> AppResult<ChargeResult>;

    async fn retrieve_token(&self, token: &str) -> AppResult<TokenInfo>;
}
