use reqwest::Client;
use serde::Deserialize;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::PaymentSource,
    domain::entities::invoice::CardDetails,
};

pub const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    api_base: String,
}

impl StripeClient {
    pub fn new(secret_key: String, api_base: String) -> Self {
        Self {
            client: Client::new(),
            secret_key,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn auth_header(&self) -> String {
        use base64::Engine;
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(format!("{}:", self.secret_key));
        format!("Basic {}", encoded)
    }

    // ========================================================================
    // Charges
    // ========================================================================

    pub async fn create_charge(
        &self,
        amount_cents: i64,
        currency: &str,
        description: &str,
        source: &PaymentSource,
        idempotency_key: &str,
    ) -> AppResult<StripeCharge> {
        let mut params: Vec<(&str, String)> = vec![
            ("amount", amount_cents.to_string()),
            ("currency", currency.to_lowercase()),
            ("description", description.to_string()),
        ];
        match source {
            PaymentSource::Customer(id) => params.push(("customer", id.clone())),
            PaymentSource::Token(token) => params.push(("source", token.clone())),
        }

        let response = self
            .client
            .post(format!("{}/charges", self.api_base))
            .header("Authorization", self.auth_header())
            .header("Idempotency-Key", idempotency_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::PaymentGateway(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }

    pub async fn retrieve_charge(&self, charge_id: &str) -> AppResult<StripeCharge> {
        let response = self
            .client
            .get(format!("{}/charges/{}", self.api_base, charge_id))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| AppError::PaymentGateway(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }

    // ========================================================================
    // Refunds
    // ========================================================================

    pub async fn create_refund(
        &self,
        charge_id: &str,
        amount_cents: Option<i64>,
    ) -> AppResult<StripeRefund> {
        let mut params: Vec<(&str, String)> = vec![("charge", charge_id.to_string())];
        if let Some(amount) = amount_cents {
            params.push(("amount", amount.to_string()));
        }

        let response = self
            .client
            .post(format!("{}/refunds", self.api_base))
            .header("Authorization", self.auth_header())
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::PaymentGateway(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }

    // ========================================================================
    // Tokens
    // ========================================================================

    pub async fn retrieve_token(&self, token: &str) -> AppResult<StripeToken> {
        let response = self
            .client
            .get(format!("{}/tokens/{}", self.api_base, token))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| AppError::PaymentGateway(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> AppResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::PaymentGateway(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            tracing::warn!(status = %status, body = %body, "Stripe API error");
            return Err(error_from_body(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(body = %body, error = %e, "Failed to parse Stripe response");
            AppError::PaymentGateway(format!("Failed to parse Stripe response: {}", e))
        })
    }
}

/// Card errors are the customer's problem; everything else is ours or Stripe's.
fn error_from_body(status: u16, body: &str) -> AppError {
    match serde_json::from_str::<StripeErrorResponse>(body) {
        Ok(StripeErrorResponse { error }) if error.error_type == "card_error" => {
            AppError::PaymentDeclined(
                error
                    .message
                    .or(error.code)
                    .unwrap_or_else(|| "Your card was declined.".to_string()),
            )
        }
        Ok(StripeErrorResponse { error }) => AppError::PaymentGateway(format!(
            "Stripe error: {}",
            error.message.unwrap_or(error.error_type)
        )),
        Err(_) => AppError::PaymentGateway(format!("Stripe API error: {}", status)),
    }
}

// ============================================================================
// Stripe Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StripeCharge {
    pub id: String,
    pub amount: i64,
    pub paid: bool,
    pub source: Option<StripeCard>,
}

#[derive(Debug, Deserialize)]
pub struct StripeCard {
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<u32>,
    pub exp_year: Option<i32>,
    pub name: Option<String>,
    pub address_state: Option<String>,
}

impl From<&StripeCard> for CardDetails {
    fn from(card: &StripeCard) -> Self {
        CardDetails {
            brand: card.brand.clone(),
            last4: card.last4.clone(),
            exp_month: card.exp_month.map(|m| m.to_string()),
            exp_year: card.exp_year.map(|y| y.to_string()),
            name: card.name.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeRefund {
    pub id: String,
    pub status: Option<String>,
}

impl StripeRefund {
    /// Pending refunds are accepted; only an outright failure is not.
    pub fn accepted(&self) -> bool {
        !matches!(self.status.as_deref(), Some("failed") | Some("canceled"))
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeToken {
    pub id: String,
    pub card: Option<StripeCard>,
}

#[derive(Debug, Deserialize)]
pub struct StripeErrorResponse {
    pub error: StripeError,
}

#[derive(Debug, Deserialize)]
pub struct StripeError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: Option<String>,
    pub code: Option<String>,
}
