use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, Row};
use uuid::Uuid;

use crate::{
    adapters::persistence::{
        PostgresPersistence, stale_write,
        subscription_period::{SELECT_COLS as PERIOD_COLS, row_to_period},
    },
    app_error::{AppError, AppResult},
    application::use_cases::invoice::InvoiceRepo,
    domain::entities::{
        invoice::{CardDetails, Invoice, InvoiceStatus},
        invoice_item::{ChargeableItem, InvoiceItem},
    },
};

fn row_to_invoice(row: &sqlx::postgres::PgRow) -> Invoice {
    Invoice {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        slug: row.get("slug"),
        status: row.get("status"),
        payment_status: row.get("payment_status"),
        failed_payment_attempt_count: row.get("failed_payment_attempt_count"),
        last_failed_payment_attempt_at: row.get("last_failed_payment_attempt_at"),
        last_failed_payment_error: row.get("last_failed_payment_error"),
        charge_started_at: row.get("charge_started_at"),
        paid_at: row.get("paid_at"),
        total_paid_cents: row.get("total_paid_cents"),
        tax_paid_cents: row.get("tax_paid_cents"),
        subtotal_refunded_cents: row.get("subtotal_refunded_cents"),
        tax_refunded_cents: row.get("tax_refunded_cents"),
        stripe_charge_id: row.get("stripe_charge_id"),
        stripe_token: row.get("stripe_token"),
        stripe_customer_id: row.get("stripe_customer_id"),
        card: CardDetails {
            brand: row.get("card_brand"),
            last4: row.get("card_last4"),
            exp_month: row.get("card_exp_month"),
            exp_year: row.get("card_exp_year"),
            name: row.get("card_name"),
        },
        lock_version: row.get("lock_version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, owner_id, slug, status, payment_status, failed_payment_attempt_count,
    last_failed_payment_attempt_at, last_failed_payment_error, charge_started_at, paid_at,
    total_paid_cents, tax_paid_cents, subtotal_refunded_cents, tax_refunded_cents,
    stripe_charge_id, stripe_token, stripe_customer_id,
    card_brand, card_last4, card_exp_month, card_exp_year, card_name,
    lock_version, created_at, updated_at
"#;

pub(super) async fn insert_invoice<'e>(
    executor: impl PgExecutor<'e>,
    invoice: &Invoice,
) -> AppResult<Invoice> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO invoices (
            id, owner_id, slug, status, payment_status, failed_payment_attempt_count,
            stripe_token, stripe_customer_id, lock_version, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, $9, $10)
        RETURNING {}
        "#,
        SELECT_COLS
    ))
    .bind(invoice.id)
    .bind(invoice.owner_id)
    .bind(&invoice.slug)
    .bind(invoice.status)
    .bind(invoice.payment_status)
    .bind(invoice.failed_payment_attempt_count)
    .bind(&invoice.stripe_token)
    .bind(&invoice.stripe_customer_id)
    .bind(invoice.created_at)
    .bind(invoice.updated_at)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)?;
    Ok(row_to_invoice(&row))
}

/// Versioned write of every mutable column.
pub(super) async fn update_invoice<'e>(
    executor: impl PgExecutor<'e>,
    invoice: &Invoice,
) -> AppResult<Invoice> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE invoices
        SET status = $3,
            payment_status = $4,
            failed_payment_attempt_count = $5,
            last_failed_payment_attempt_at = $6,
            last_failed_payment_error = $7,
            charge_started_at = $8,
            paid_at = $9,
            total_paid_cents = $10,
            tax_paid_cents = $11,
            subtotal_refunded_cents = $12,
            tax_refunded_cents = $13,
            stripe_charge_id = $14,
            stripe_token = $15,
            stripe_customer_id = $16,
            card_brand = $17,
            card_last4 = $18,
            card_exp_month = $19,
            card_exp_year = $20,
            card_name = $21,
            updated_at = $22,
            lock_version = lock_version + 1
        WHERE id = $1 AND lock_version = $2
        RETURNING {}
        "#,
        SELECT_COLS
    ))
    .bind(invoice.id)
    .bind(invoice.lock_version)
    .bind(invoice.status)
    .bind(invoice.payment_status)
    .bind(invoice.failed_payment_attempt_count)
    .bind(invoice.last_failed_payment_attempt_at)
    .bind(&invoice.last_failed_payment_error)
    .bind(invoice.charge_started_at)
    .bind(invoice.paid_at)
    .bind(invoice.total_paid_cents)
    .bind(invoice.tax_paid_cents)
    .bind(invoice.subtotal_refunded_cents)
    .bind(invoice.tax_refunded_cents)
    .bind(&invoice.stripe_charge_id)
    .bind(&invoice.stripe_token)
    .bind(&invoice.stripe_customer_id)
    .bind(&invoice.card.brand)
    .bind(&invoice.card.last4)
    .bind(&invoice.card.exp_month)
    .bind(&invoice.card.exp_year)
    .bind(&invoice.card.name)
    .bind(invoice.updated_at)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)?;

    row.as_ref()
        .map(row_to_invoice)
        .ok_or_else(|| stale_write("Invoice"))
}

/// Links an item to an invoice that is still open.
pub(super) async fn link_item<'e>(
    executor: impl PgExecutor<'e>,
    item: &InvoiceItem,
) -> AppResult<InvoiceItem> {
    let row = sqlx::query(
        r#"
        WITH target AS (
            SELECT status = 'open' AS open FROM invoices WHERE id = $2
        ),
        linked AS (
            INSERT INTO invoice_items (id, invoice_id, item_type, item_id, created_at)
            SELECT $1, $2, $3, $4, $5
            WHERE EXISTS (SELECT 1 FROM target WHERE open)
            ON CONFLICT (item_type, item_id) DO NOTHING
            RETURNING id
        )
        SELECT EXISTS (SELECT 1 FROM linked) AS linked, (SELECT open FROM target) AS open
        "#,
    )
    .bind(item.id)
    .bind(item.invoice_id)
    .bind(item.item_type)
    .bind(item.item_id)
    .bind(item.created_at)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)?;

    link_outcome(item, row.get("linked"), row.get("open"))
}

/// `open` is `None` when the invoice does not exist.
fn link_outcome(item: &InvoiceItem, linked: bool, open: Option<bool>) -> AppResult<InvoiceItem> {
    match (linked, open) {
        (true, _) => Ok(item.clone()),
        (false, None) => Err(AppError::NotFound),
        (false, Some(false)) => Err(AppError::InvalidState(
            "Items can only be added to an open invoice".into(),
        )),
        (false, Some(true)) => Err(AppError::InvalidInput(format!(
            "Item {} is already on an invoice",
            item.item_id
        ))),
    }
}

#[async_trait]
impl InvoiceRepo for PostgresPersistence {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Invoice>> {
        let row = sqlx::query(&format!("SELECT {} FROM invoices WHERE id = $1", SELECT_COLS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_invoice))
    }

    async fn get_open_for_owner(&self, owner_id: Uuid) -> AppResult<Option<Invoice>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM invoices WHERE owner_id = $1 AND status = 'open'",
            SELECT_COLS
        ))
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_invoice))
    }

    async fn list_for_owner(
        &self,
        owner_id: Uuid,
        status: Option<InvoiceStatus>,
    ) -> AppResult<Vec<Invoice>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM invoices
            WHERE owner_id = $1 AND ($2::invoice_status IS NULL OR status = $2)
            ORDER BY created_at DESC
            "#,
            SELECT_COLS
        ))
        .bind(owner_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.iter().map(row_to_invoice).collect())
    }

    async fn count_for_owner(
        &self,
        owner_id: Uuid,
        status: Option<InvoiceStatus>,
    ) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM invoices
            WHERE owner_id = $1 AND ($2::invoice_status IS NULL OR status = $2)
            "#,
        )
        .bind(owner_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(count)
    }

    async fn list_retryable(&self, max_failed_attempts: i32) -> AppResult<Vec<Invoice>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM invoices
            WHERE status = 'ready_for_payment' AND failed_payment_attempt_count < $1
            ORDER BY created_at ASC
            "#,
            SELECT_COLS
        ))
        .bind(max_failed_attempts)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.iter().map(row_to_invoice).collect())
    }

    async fn list_items(&self, invoice_id: Uuid) -> AppResult<Vec<ChargeableItem>> {
        let period_cols = PERIOD_COLS
            .split(',')
            .map(|col| format!("p.{}", col.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM invoice_items ii
            JOIN subscription_periods p
              ON ii.item_type = 'subscription_period' AND p.id = ii.item_id
            WHERE ii.invoice_id = $1
            ORDER BY ii.created_at ASC
            "#,
            period_cols
        ))
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows
            .iter()
            .map(|row| ChargeableItem::SubscriptionPeriod(row_to_period(row)))
            .collect())
    }

    async fn add_item(&self, item: &InvoiceItem) -> AppResult<InvoiceItem> {
        link_item(&self.pool, item).await
    }

    async fn save(&self, invoice: &Invoice) -> AppResult<Invoice> {
        update_invoice(&self.pool, invoice).await
    }

    async fn cancel_ready_for_payment(&self, owner_id: Uuid, now: DateTime<Utc>) -> AppResult<u64> {
        cancel_ready_for_payment(&self.pool, owner_id, now).await
    }

    async fn earliest_paid_at(&self, owner_id: Uuid) -> AppResult<Option<DateTime<Utc>>> {
        let earliest: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            SELECT MIN(paid_at) FROM invoices
            WHERE owner_id = $1 AND status = 'paid' AND total_paid_cents > 0
            "#,
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(earliest)
    }
}

pub(super) async fn cancel_ready_for_payment<'e>(
    executor: impl PgExecutor<'e>,
    owner_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE invoices
        SET status = 'cancelled', updated_at = $2, lock_version = lock_version + 1
        WHERE owner_id = $1 AND status = 'ready_for_payment'
        "#,
    )
    .bind(owner_id)
    .bind(now)
    .execute(executor)
    .await
    .map_err(AppError::from)?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::invoice_item::ChargeableKind;

    fn item() -> InvoiceItem {
        InvoiceItem {
            id: Uuid::now_v7(),
            invoice_id: Uuid::now_v7(),
            item_type: ChargeableKind::SubscriptionPeriod,
            item_id: Uuid::now_v7(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn link_outcome_separates_closed_invoice_from_duplicate_item() {
        let item = item();
        assert_eq!(link_outcome(&item, true, Some(true)).unwrap(), item);
        assert_eq!(link_outcome(&item, false, None).unwrap_err(), AppError::NotFound);
        assert!(matches!(
            link_outcome(&item, false, Some(false)),
            Err(AppError::InvalidState(_))
        ));
        assert!(matches!(
            link_outcome(&item, false, Some(true)),
            Err(AppError::InvalidInput(_))
        ));
    }
}
