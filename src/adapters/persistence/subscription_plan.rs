use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::plan_change::SubscriptionPlanRepo,
    domain::entities::{billing_interval::BillingInterval, subscription_plan::SubscriptionPlan},
};

fn row_to_plan(row: &sqlx::postgres::PgRow) -> SubscriptionPlan {
    SubscriptionPlan {
        id: row.get("id"),
        group_id: row.get("group_id"),
        code: row.get("code"),
        name: row.get("name"),
        interval: row.get("interval"),
        amount_cents: row.get("amount_cents"),
        visible: row.get("visible"),
        position: row.get("position"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, group_id, code, name, interval, amount_cents, visible, position,
    created_at, updated_at
"#;

#[async_trait]
impl SubscriptionPlanRepo for PostgresPersistence {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<SubscriptionPlan>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscription_plans WHERE id = $1",
            SELECT_COLS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_plan))
    }

    async fn get_by_code(&self, code: &str) -> AppResult<Option<SubscriptionPlan>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscription_plans WHERE code = $1",
            SELECT_COLS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_plan))
    }

    async fn find_visible_by_terms(
        &self,
        interval: BillingInterval,
        amount_cents: i64,
    ) -> AppResult<Option<SubscriptionPlan>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM subscription_plans
            WHERE visible AND interval = $1 AND amount_cents = $2
            ORDER BY position ASC
            LIMIT 1
            "#,
            SELECT_COLS
        ))
        .bind(interval)
        .bind(amount_cents)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_plan))
    }

    async fn list_visible(&self) -> AppResult<Vec<SubscriptionPlan>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM subscription_plans WHERE visible ORDER BY position ASC, amount_cents ASC",
            SELECT_COLS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.iter().map(row_to_plan).collect())
    }
}
