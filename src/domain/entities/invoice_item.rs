use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::subscription_period::SubscriptionPeriod;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    sqlx::Type,
    AsRefStr,
    Display,
    EnumString,
)]
#[sqlx(type_name = "chargeable_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ChargeableKind {
    SubscriptionPeriod,
}

/// Anything that can be billed on an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "item", rename_all = "snake_case")]
pub enum ChargeableItem {
    SubscriptionPeriod(SubscriptionPeriod),
}

impl ChargeableItem {
    pub fn kind(&self) -> ChargeableKind {
        match self {
            ChargeableItem::SubscriptionPeriod(_) => ChargeableKind::SubscriptionPeriod,
        }
    }

    pub fn item_id(&self) -> Uuid {
        match self {
            ChargeableItem::SubscriptionPeriod(p) => p.id,
        }
    }

    pub fn amount_cents(&self) -> i64 {
        match self {
            ChargeableItem::SubscriptionPeriod(p) => p.amount_cents,
        }
    }

    pub fn is_subscription_period(&self) -> bool {
        matches!(self, ChargeableItem::SubscriptionPeriod(_))
    }
}

/// Link between an invoice and one chargeable item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub item_type: ChargeableKind,
    pub item_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl InvoiceItem {
    pub fn link(invoice_id: Uuid, item: &ChargeableItem, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            invoice_id,
            item_type: item.kind(),
            item_id: item.item_id(),
            created_at: now,
        }
    }
}

pub fn subtotal_cents(items: &[ChargeableItem]) -> i64 {
    items.iter().map(ChargeableItem::amount_cents).sum()
}
