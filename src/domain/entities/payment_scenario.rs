use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumString};

/// Outcome simulated by the dummy gateway.
/// Mirrors a subset of the processor's test card behaviours.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[derive(Default)]
pub enum PaymentScenario {
    /// Test card 4242424242424242
    #[default]
    Success,
    /// Test card 4000000000000002
    Decline,
    /// Test card 4000000000009995
    InsufficientFunds,
    /// Test card 4000000000000069
    ExpiredCard,
    /// Test card 4000000000000119
    ProcessingError,
}

impl PaymentScenario {
    /// Detect scenario from a test card number.
    pub fn from_card_number(card: &str) -> Self {
        let card = card.replace([' ', '-'], "");

        match card.as_str() {
            "4242424242424242" => PaymentScenario::Success,
            "4000000000000002" => PaymentScenario::Decline,
            "4000000000009995" => PaymentScenario::InsufficientFunds,
            "4000000000000069" => PaymentScenario::ExpiredCard,
            "4000000000000119" => PaymentScenario::ProcessingError,
            s if s.starts_with("4242") => PaymentScenario::Success,
            s if s.starts_with("4000") => PaymentScenario::Decline,
            _ => PaymentScenario::Success,
        }
    }

    /// Detect scenario from a stored customer reference or token, e.g. `cus_decline`
    /// or `tok_4000000000000002`.
    pub fn from_payment_source(source: &str) -> Self {
        let rest = ["tok_", "cus_", "dummy_"]
            .iter()
            .find_map(|prefix| source.strip_prefix(prefix))
            .unwrap_or(source);

        PaymentScenario::from_str(rest).unwrap_or_else(|_| Self::from_card_number(rest))
    }

    /// Card errors are reported as declines; the rest as processor failures.
    pub fn is_card_error(&self) -> bool {
        matches!(
            self,
            PaymentScenario::Decline
                | PaymentScenario::InsufficientFunds
                | PaymentScenario::ExpiredCard
        )
    }

    pub fn error_message(&self) -> Option<&'static str> {
        match self {
            PaymentScenario::Success => None,
            PaymentScenario::Decline => Some("Your card was declined."),
            PaymentScenario::InsufficientFunds => Some("Your card has insufficient funds."),
            PaymentScenario::ExpiredCard => Some("Your card has expired."),
            PaymentScenario::ProcessingError => {
                Some("An error occurred while processing your card.")
            }
        }
    }
}
