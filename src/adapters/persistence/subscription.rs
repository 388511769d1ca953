use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, Row};
use uuid::Uuid;

use crate::{
    adapters::persistence::{PostgresPersistence, stale_write},
    app_error::{AppError, AppResult},
    application::use_cases::subscription::SubscriptionRepo,
    domain::entities::{subscription::Subscription, subscription_status::SubscriptionStatus},
};

fn row_to_subscription(row: &sqlx::postgres::PgRow) -> Subscription {
    Subscription {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        status: row.get("status"),
        interval: row.get("interval"),
        amount_cents_base: row.get("amount_cents_base"),
        amount_cents_next_period: row.get("amount_cents_next_period"),
        next_bill_date: row.get("next_bill_date"),
        current_status_at: row.get("current_status_at"),
        first_paid_at: row.get("first_paid_at"),
        lock_version: row.get("lock_version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, owner_id, status, interval, amount_cents_base, amount_cents_next_period,
    next_bill_date, current_status_at, first_paid_at, lock_version,
    created_at, updated_at
"#;

pub(super) async fn insert_subscription<'e>(
    executor: impl PgExecutor<'e>,
    subscription: &Subscription,
) -> AppResult<Subscription> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO subscriptions (
            id, owner_id, status, interval, amount_cents_base, amount_cents_next_period,
            next_bill_date, current_status_at, first_paid_at, lock_version,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0, $10, $11)
        RETURNING {}
        "#,
        SELECT_COLS
    ))
    .bind(subscription.id)
    .bind(subscription.owner_id)
    .bind(subscription.status)
    .bind(subscription.interval)
    .bind(subscription.amount_cents_base)
    .bind(subscription.amount_cents_next_period)
    .bind(subscription.next_bill_date)
    .bind(subscription.current_status_at)
    .bind(subscription.first_paid_at)
    .bind(subscription.created_at)
    .bind(subscription.updated_at)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)?;
    Ok(row_to_subscription(&row))
}

/// Versioned write of every mutable column.
pub(super) async fn update_subscription<'e>(
    executor: impl PgExecutor<'e>,
    subscription: &Subscription,
) -> AppResult<Subscription> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE subscriptions
        SET status = $3,
            interval = $4,
            amount_cents_base = $5,
            amount_cents_next_period = $6,
            next_bill_date = $7,
            current_status_at = $8,
            first_paid_at = $9,
            updated_at = $10,
            lock_version = lock_version + 1
        WHERE id = $1 AND lock_version = $2
        RETURNING {}
        "#,
        SELECT_COLS
    ))
    .bind(subscription.id)
    .bind(subscription.lock_version)
    .bind(subscription.status)
    .bind(subscription.interval)
    .bind(subscription.amount_cents_base)
    .bind(subscription.amount_cents_next_period)
    .bind(subscription.next_bill_date)
    .bind(subscription.current_status_at)
    .bind(subscription.first_paid_at)
    .bind(subscription.updated_at)
    .fetch_optional(executor)
    .await
    .map_err(AppError::from)?;

    row.as_ref()
        .map(row_to_subscription)
        .ok_or_else(|| stale_write("Subscription"))
}

fn cycleable_status_list() -> String {
    SubscriptionStatus::cycleable()
        .iter()
        .map(|status| format!("'{}'", status.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl SubscriptionRepo for PostgresPersistence {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE id = $1",
            SELECT_COLS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_subscription))
    }

    async fn get_by_owner(&self, owner_id: Uuid) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE owner_id = $1",
            SELECT_COLS
        ))
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_subscription))
    }

    async fn list_ready_to_cycle(&self, now: DateTime<Utc>) -> AppResult<Vec<Subscription>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM subscriptions
            WHERE status IN ({}) AND next_bill_date < $1
            ORDER BY next_bill_date ASC
            "#,
            SELECT_COLS,
            cycleable_status_list()
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.iter().map(row_to_subscription).collect())
    }

    async fn save(&self, subscription: &Subscription) -> AppResult<Subscription> {
        update_subscription(&self.pool, subscription).await
    }
}
