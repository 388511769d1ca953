use async_trait::async_trait;
use sqlx::{PgExecutor, Row};
use uuid::Uuid;

use crate::{
    adapters::persistence::{PostgresPersistence, stale_write},
    app_error::{AppError, AppResult},
    application::use_cases::subscription::SubscriptionPeriodRepo,
    domain::entities::subscription_period::SubscriptionPeriod,
};

pub(super) fn row_to_period(row: &sqlx::postgres::PgRow) -> SubscriptionPeriod {
    SubscriptionPeriod {
        id: row.get("id"),
        subscription_id: row.get("subscription_id"),
        amount_cents: row.get("amount_cents"),
        start_at: row.get("start_at"),
        end_at: row.get("end_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub(super) const SELECT_COLS: &str = r#"
    id, subscription_id, amount_cents, start_at, end_at, created_at, updated_at
"#;

pub(super) async fn insert_period<'e>(
    executor: impl PgExecutor<'e>,
    period: &SubscriptionPeriod,
) -> AppResult<SubscriptionPeriod> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO subscription_periods (
            id, subscription_id, amount_cents, start_at, end_at, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {}
        "#,
        SELECT_COLS
    ))
    .bind(period.id)
    .bind(period.subscription_id)
    .bind(period.amount_cents)
    .bind(period.start_at)
    .bind(period.end_at)
    .bind(period.created_at)
    .bind(period.updated_at)
    .fetch_one(executor)
    .await
    .map_err(AppError::from)?;
    Ok(row_to_period(&row))
}

/// Stamps `end_at` on a period that is still open.
pub(super) async fn close_period<'e>(
    executor: impl PgExecutor<'e>,
    period: &SubscriptionPeriod,
) -> AppResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE subscription_periods
        SET end_at = $2, updated_at = $3
        WHERE id = $1 AND end_at IS NULL
        "#,
    )
    .bind(period.id)
    .bind(period.end_at)
    .bind(period.updated_at)
    .execute(executor)
    .await
    .map_err(AppError::from)?;

    if result.rows_affected() == 0 {
        return Err(stale_write("Subscription period"));
    }
    Ok(())
}

#[async_trait]
impl SubscriptionPeriodRepo for PostgresPersistence {
    async fn get_current(&self, subscription_id: Uuid) -> AppResult<Option<SubscriptionPeriod>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscription_periods WHERE subscription_id = $1 AND end_at IS NULL",
            SELECT_COLS
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_period))
    }

    async fn count_for_subscription(&self, subscription_id: Uuid) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM subscription_periods WHERE subscription_id = $1")
                .bind(subscription_id)
                .fetch_one(&self.pool)
                .await
                .map_err(AppError::from)?;
        Ok(count)
    }

    async fn list_for_subscription(
        &self,
        subscription_id: Uuid,
    ) -> AppResult<Vec<SubscriptionPeriod>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM subscription_periods WHERE subscription_id = $1 ORDER BY start_at DESC",
            SELECT_COLS
        ))
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.iter().map(row_to_period).collect())
    }
}
