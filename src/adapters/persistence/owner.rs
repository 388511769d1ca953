use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::ports::owner_directory::{OwnerDirectory, OwnerProfile},
};

fn row_to_owner(row: &sqlx::postgres::PgRow) -> OwnerProfile {
    OwnerProfile {
        id: row.get("id"),
        display_name: row.get("display_name"),
        stripe_customer_id: row.get("stripe_customer_id"),
        stripe_token: row.get("stripe_token"),
        has_valid_card_on_file: row.get("has_valid_card_on_file"),
        tax_exempt: row.get("tax_exempt"),
        billing_state: row.get("billing_state"),
    }
}

// Owners are written by the host application; billing only reads them.
#[async_trait]
impl OwnerDirectory for PostgresPersistence {
    async fn get_owner(&self, owner_id: Uuid) -> AppResult<Option<OwnerProfile>> {
        let row = sqlx::query(
            r#"
            SELECT id, display_name, stripe_customer_id, stripe_token,
                   has_valid_card_on_file, tax_exempt, billing_state
            FROM billing_owners
            WHERE id = $1
            "#,
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_owner))
    }
}
