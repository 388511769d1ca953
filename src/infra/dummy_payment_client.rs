use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::{
        ChargeRequest, ChargeResult, PaymentGatewayPort, TokenInfo,
    },
    domain::entities::{invoice::CardDetails, payment_scenario::PaymentScenario},
};

/// Local stand-in for the card processor.
///
/// The outcome of a charge is read off the payment source: `cus_decline`,
/// `tok_4000000000000002` and friends fail the way the processor's test cards do,
/// anything else succeeds. Repeated idempotency keys return the original charge.
#[derive(Default)]
pub struct DummyPaymentClient {
    charges_by_key: Mutex<HashMap<String, String>>,
}

impl DummyPaymentClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn test_card() -> CardDetails {
        CardDetails {
            brand: Some("Visa".to_string()),
            last4: Some("4242".to_string()),
            exp_month: Some("12".to_string()),
            exp_year: Some("2034".to_string()),
            name: None,
        }
    }

    fn process_scenario(scenario: PaymentScenario) -> AppResult<()> {
        match scenario.error_message() {
            None => Ok(()),
            Some(message) if scenario.is_card_error() => {
                Err(AppError::PaymentDeclined(message.to_string()))
            }
            Some(message) => Err(AppError::PaymentGateway(message.to_string())),
        }
    }
}

#[async_trait]
impl PaymentGatewayPort for DummyPaymentClient {
    async fn charge(&self, request: &ChargeRequest) -> AppResult<ChargeResult> {
        let scenario = PaymentScenario::from_payment_source(request.source.as_str());
        Self::process_scenario(scenario)?;

        let mut charges = self
            .charges_by_key
            .lock()
            .map_err(|_| AppError::Internal("dummy gateway state poisoned".into()))?;
        let charge_id = charges
            .entry(request.idempotency_key.clone())
            .or_insert_with(|| format!("dummy_ch_{}", Uuid::new_v4().simple()))
            .clone();

        tracing::debug!(
            charge_id = %charge_id,
            amount_cents = request.amount_cents,
            "Dummy charge succeeded"
        );
        Ok(ChargeResult {
            charge_id,
            card: Self::test_card(),
        })
    }

    async fn refund(&self, charge_id: &str, amount_cents: Option<i64>) -> AppResult<bool> {
        tracing::debug!(charge_id, ?amount_cents, "Dummy refund accepted");
        Ok(true)
    }

    async fn retrieve_charge(&self, charge_id: &str) -> AppResult<ChargeResult> {
        Ok(ChargeResult {
            charge_id: charge_id.to_string(),
            card: Self::test_card(),
        })
    }

    async fn retrieve_token(&self, _token: &str) -> AppResult<TokenInfo> {
        Ok(TokenInfo {
            card_address_state: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::payment_gateway::PaymentSource;

    fn request(source: PaymentSource, key: &str) -> ChargeRequest {
        ChargeRequest {
            amount_cents: 1000,
            currency: "usd".to_string(),
            description: "Subscription for Acme Co".to_string(),
            source,
            idempotency_key: key.to_string(),
        }
    }

    #[tokio::test]
    async fn test_charge_success() {
        let client = DummyPaymentClient::new();
        let result = client
            .charge(&request(PaymentSource::Customer("cus_test".into()), "k1"))
            .await
            .unwrap();
        assert!(result.charge_id.starts_with("dummy_ch_"));
        assert_eq!(result.card.last4.as_deref(), Some("4242"));
    }

    #[tokio::test]
    async fn test_charge_decline_is_card_error() {
        let client = DummyPaymentClient::new();
        let err = client
            .charge(&request(PaymentSource::Token("tok_4000000000000002".into()), "k1"))
            .await
            .unwrap_err();
        assert_eq!(err, AppError::PaymentDeclined("Your card was declined.".into()));
    }

    #[tokio::test]
    async fn test_processing_error_is_gateway_failure() {
        let client = DummyPaymentClient::new();
        let err = client
            .charge(&request(PaymentSource::Customer("cus_processing_error".into()), "k1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PaymentGateway(_)));
    }

    #[tokio::test]
    async fn test_same_idempotency_key_returns_same_charge() {
        let client = DummyPaymentClient::new();
        let source = PaymentSource::Customer("cus_test".into());
        let first = client.charge(&request(source.clone(), "invoice-1-attempt-0")).await.unwrap();
        let again = client.charge(&request(source.clone(), "invoice-1-attempt-0")).await.unwrap();
        let next = client.charge(&request(source, "invoice-1-attempt-1")).await.unwrap();
        assert_eq!(first.charge_id, again.charge_id);
        assert_ne!(first.charge_id, next.charge_id);
    }
}
