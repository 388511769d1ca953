use async_trait::async_trait;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::{
        ChargeRequest, ChargeResult, PaymentGatewayPort, TokenInfo,
    },
    domain::entities::invoice::CardDetails,
    infra::stripe_client::StripeClient,
};

/// Adapter that wraps StripeClient to implement PaymentGatewayPort.
#[derive(Clone)]
pub struct StripeGateway {
    client: StripeClient,
}

impl StripeGateway {
    pub fn new(secret_key: String, api_base: String) -> Self {
        Self {
            client: StripeClient::new(secret_key, api_base),
        }
    }
}

#[async_trait]
impl PaymentGatewayPort for StripeGateway {
    async fn charge(&self, request: &ChargeRequest) -> AppResult<ChargeResult> {
        let charge = self
            .client
            .create_charge(
                request.amount_cents,
                &request.currency,
                &request.description,
                &request.source,
                &request.idempotency_key,
            )
            .await?;

        if !charge.paid {
            return Err(AppError::PaymentDeclined(format!(
                "Charge {} was not paid",
                charge.id
            )));
        }

        Ok(ChargeResult {
            card: charge.source.as_ref().map(CardDetails::from).unwrap_or_default(),
            charge_id: charge.id,
        })
    }

    async fn refund(&self, charge_id: &str, amount_cents: Option<i64>) -> AppResult<bool> {
        let refund = self.client.create_refund(charge_id, amount_cents).await?;
        tracing::info!(charge_id, refund_id = %refund.id, status = ?refund.status, "Refund created");
        Ok(refund.accepted())
    }

    async fn retrieve_charge(&self, charge_id: &str) -> AppResult<ChargeResult> {
        let charge = self.client.retrieve_charge(charge_id).await?;
        Ok(ChargeResult {
            card: charge.source.as_ref().map(CardDetails::from).unwrap_or_default(),
            charge_id: charge.id,
        })
    }

    async fn retrieve_token(&self, token: &str) -> AppResult<TokenInfo> {
        let token = self.client.retrieve_token(token).await?;
        Ok(TokenInfo {
            card_address_state: token.card.and_then(|card| card.address_state),
        })
    }
}
