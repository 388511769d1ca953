use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::app_error::AppResult;

/// Billing identity of the entity that owns a subscription and its invoices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerProfile {
    pub id: Uuid,
    pub display_name: String,
    pub stripe_customer_id: Option<String>,
    #[serde(skip_serializing)]
    pub stripe_token: Option<String>,
    pub has_valid_card_on_file: bool,
    pub tax_exempt: bool,
    /// Billing-address state, used for tax when charging by customer reference.
    pub billing_state: Option<String>,
}

#[async_trait]
pub trait OwnerDirectory: Send + Sync {
    async fn get_owner(&self, owner_id: Uuid) -> AppResult<Option<OwnerProfile>>;
}
