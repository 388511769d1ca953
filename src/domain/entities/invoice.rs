use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Invoices past this many failed attempts are left for an operator.
pub const MAX_RETRIES: i32 = 4;

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
#[sqlx(type_name = "invoice_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[derive(Default)]
pub enum InvoiceStatus {
    #[default]
    Open,
    ReadyForPayment,
    Paid,
    Cancelled,
    Refunded,
}

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
#[sqlx(type_name = "invoice_payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[derive(Default)]
pub enum InvoicePaymentStatus {
    #[default]
    Uncharged,
    PaymentSucceeded,
    PaymentFailed,
    PaymentPartiallyRefunded,
    PaymentFullyRefunded,
}

impl InvoicePaymentStatus {
    /// A charge may be attempted from these states only.
    pub fn is_chargeable(&self) -> bool {
        matches!(
            self,
            InvoicePaymentStatus::Uncharged | InvoicePaymentStatus::PaymentFailed
        )
    }
}

/// Card summary returned by the gateway and snapshotted on the invoice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<String>,
    pub exp_year: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invoice {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub slug: String,
    pub status: InvoiceStatus,
    pub payment_status: InvoicePaymentStatus,
    pub failed_payment_attempt_count: i32,
    pub last_failed_payment_attempt_at: Option<DateTime<Utc>>,
    pub last_failed_payment_error: Option<String>,
    /// Set while a charge attempt holds the invoice.
    pub charge_started_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub total_paid_cents: i64,
    pub tax_paid_cents: i64,
    pub subtotal_refunded_cents: i64,
    pub tax_refunded_cents: i64,
    pub stripe_charge_id: Option<String>,
    #[serde(skip_serializing)]
    pub stripe_token: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub card: CardDetails,
    pub lock_version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// A fresh invoice accumulating charges for `owner_id`.
    pub fn open(
        owner_id: Uuid,
        slug: String,
        stripe_customer_id: Option<String>,
        stripe_token: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            owner_id,
            slug,
            status: InvoiceStatus::Open,
            payment_status: InvoicePaymentStatus::Uncharged,
            failed_payment_attempt_count: 0,
            last_failed_payment_attempt_at: None,
            last_failed_payment_error: None,
            charge_started_at: None,
            paid_at: None,
            total_paid_cents: 0,
            tax_paid_cents: 0,
            subtotal_refunded_cents: 0,
            tax_refunded_cents: 0,
            stripe_charge_id: None,
            stripe_token,
            stripe_customer_id,
            card: CardDetails::default(),
            lock_version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Human-facing identifier, unique per owner ordinal.
    pub fn slug_for(owner_id: Uuid, ordinal: i64) -> String {
        let simple = owner_id.simple().to_string().to_uppercase();
        format!("INV-{}-{:04}", &simple[simple.len() - 10..], ordinal)
    }

    pub fn subtotal_paid_cents(&self) -> i64 {
        self.total_paid_cents - self.tax_paid_cents
    }

    pub fn amount_refunded_cents(&self) -> i64 {
        self.subtotal_refunded_cents + self.tax_refunded_cents
    }

    /// Closes the invoice for payment. With nothing on it there is nothing to collect,
    /// so it goes straight to paid.
    pub fn mark_ready_for_payment(&mut self, item_count: usize, now: DateTime<Utc>) {
        if item_count == 0 {
            self.status = InvoiceStatus::Paid;
            self.payment_status = InvoicePaymentStatus::PaymentSucceeded;
            self.paid_at = Some(now);
        } else {
            self.status = InvoiceStatus::ReadyForPayment;
        }
        self.updated_at = now;
    }

    /// Whether enough backoff has elapsed since the last failure to charge again.
    pub fn ready_to_retry(&self, now: DateTime<Utc>) -> bool {
        if self.status != InvoiceStatus::ReadyForPayment {
            return false;
        }
        if self.failed_payment_attempt_count >= MAX_RETRIES {
            return false;
        }

        let required_gap = Duration::hours(24 * self.failed_payment_attempt_count as i64)
            - Duration::hours(2);
        match self.last_failed_payment_attempt_at {
            None => true,
            Some(last) => now - last >= required_gap,
        }
    }

    /// Whether another attempt currently holds the invoice.
    pub fn charge_in_progress(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        self.charge_started_at
            .is_some_and(|started| now - started < stale_after)
    }

    pub fn record_payment(
        &mut self,
        total_cents: i64,
        tax_cents: i64,
        charge_id: Option<String>,
        card: Option<CardDetails>,
        now: DateTime<Utc>,
    ) {
        self.total_paid_cents = total_cents;
        self.tax_paid_cents = tax_cents;
        if charge_id.is_some() {
            self.stripe_charge_id = charge_id;
        }
        if let Some(card) = card {
            self.card = card;
        }
        self.paid_at = Some(now);
        self.status = InvoiceStatus::Paid;
        self.payment_status = InvoicePaymentStatus::PaymentSucceeded;
        self.last_failed_payment_error = None;
        self.charge_started_at = None;
        self.updated_at = now;
    }

    pub fn record_failed_attempt(&mut self, error: String, now: DateTime<Utc>) {
        self.failed_payment_attempt_count += 1;
        self.last_failed_payment_attempt_at = Some(now);
        self.last_failed_payment_error = Some(error);
        self.payment_status = InvoicePaymentStatus::PaymentFailed;
        self.charge_started_at = None;
        self.updated_at = now;
    }

    pub fn record_full_refund(&mut self, now: DateTime<Utc>) {
        self.payment_status = InvoicePaymentStatus::PaymentFullyRefunded;
        self.subtotal_refunded_cents = self.subtotal_paid_cents();
        self.tax_refunded_cents = self.tax_paid_cents;
        self.status = InvoiceStatus::Refunded;
        self.updated_at = now;
    }

    pub fn record_tax_refund(&mut self, now: DateTime<Utc>) {
        self.payment_status = InvoicePaymentStatus::PaymentPartiallyRefunded;
        self.tax_refunded_cents = self.tax_paid_cents;
        self.updated_at = now;
    }
}
