//! Integer-cents arithmetic and the sales-tax rate table.
//!
//! Amounts are `i64` cents everywhere. Intermediate ratios go through `Decimal` and are
//! rounded half away from zero, the same way the ledger has always rounded.

use std::collections::HashMap;

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use serde::{Deserialize, Deserializer};

/// Tax rate per billing-address state, as a fraction (0.0825 = 8.25%).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaxRateTable {
    rates: HashMap<String, Decimal>,
}

impl TaxRateTable {
    pub fn new(rates: impl IntoIterator<Item = (String, Decimal)>) -> Self {
        Self {
            rates: rates
                .into_iter()
                .map(|(state, rate)| (normalize_state(&state), rate))
                .collect(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn rate_for(&self, state: &str) -> Option<Decimal> {
        self.rates.get(&normalize_state(state)).copied()
    }

    /// Tax on `subtotal_cents`. Exempt owners and unknown states pay none.
    pub fn tax_owed_cents(
        &self,
        tax_exempt: bool,
        billing_state: Option<&str>,
        subtotal_cents: i64,
    ) -> i64 {
        if tax_exempt || subtotal_cents <= 0 {
            return 0;
        }
        billing_state
            .and_then(|state| self.rate_for(state))
            .map(|rate| round_cents(rate * Decimal::from(subtotal_cents)))
            .unwrap_or(0)
    }
}

impl<'de> Deserialize<'de> for TaxRateTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = HashMap::<String, Decimal>::deserialize(deserializer)?;
        Ok(TaxRateTable::new(raw))
    }
}

fn normalize_state(state: &str) -> String {
    state.trim().to_ascii_uppercase()
}

/// Rounds to whole cents, half away from zero.
pub fn round_cents(value: Decimal) -> i64 {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
}

/// Whole days between two instants, rounded to the nearest day.
pub fn rounded_days(seconds: i64) -> i64 {
    round_cents(Decimal::from(seconds) / Decimal::from(86_400))
}

/// `amount_cents × numerator / denominator`, rounded. A non-positive denominator yields 0.
pub fn prorate_cents(amount_cents: i64, numerator: i64, denominator: i64) -> i64 {
    if denominator <= 0 {
        return 0;
    }
    round_cents(Decimal::from(amount_cents) * Decimal::from(numerator) / Decimal::from(denominator))
}
