//! Multi-row writes that must land together. Each method runs in one transaction; an
//! early return drops the transaction, which rolls it back.

use async_trait::async_trait;

use crate::{
    adapters::persistence::{
        PostgresPersistence,
        invoice::{cancel_ready_for_payment, insert_invoice, link_item, update_invoice},
        subscription::{insert_subscription, update_subscription},
        subscription_period::{close_period, insert_period},
    },
    app_error::{AppError, AppResult},
    application::use_cases::billing_cycle::{BillingLedgerRepo, CommittedCycle, CycleCommit},
    domain::entities::{
        invoice::Invoice,
        invoice_item::{ChargeableItem, InvoiceItem},
        subscription::Subscription,
    },
};

#[async_trait]
impl BillingLedgerRepo for PostgresPersistence {
    async fn open_subscription(
        &self,
        subscription: &Subscription,
        invoice: &Invoice,
    ) -> AppResult<Subscription> {
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        let created = insert_subscription(&mut *tx, subscription).await?;

        let has_open: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM invoices WHERE owner_id = $1 AND status = 'open')",
        )
        .bind(invoice.owner_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::from)?;
        if !has_open {
            insert_invoice(&mut *tx, invoice).await?;
        }

        tx.commit().await.map_err(AppError::from)?;
        Ok(created)
    }

    async fn commit_cycle(&self, commit: &CycleCommit) -> AppResult<CommittedCycle> {
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        let subscription = update_subscription(&mut *tx, &commit.subscription).await?;

        // Close before open: at most one open period per subscription.
        if let Some(closed) = &commit.closed_period {
            close_period(&mut *tx, closed).await?;
        }
        if let Some(opened) = &commit.opened_period {
            insert_period(&mut *tx, opened).await?;
            let item = InvoiceItem::link(
                commit.billed_invoice.id,
                &ChargeableItem::SubscriptionPeriod(opened.clone()),
                opened.created_at,
            );
            link_item(&mut *tx, &item).await?;
        }

        let billed_invoice = update_invoice(&mut *tx, &commit.billed_invoice).await?;
        let fresh_invoice = insert_invoice(&mut *tx, &commit.fresh_invoice).await?;

        tx.commit().await.map_err(AppError::from)?;
        Ok(CommittedCycle {
            subscription,
            billed_invoice,
            fresh_invoice,
        })
    }

    async fn rotate_open_invoice(&self, closing: &Invoice, fresh: &Invoice) -> AppResult<Invoice> {
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;
        let closed = update_invoice(&mut *tx, closing).await?;
        insert_invoice(&mut *tx, fresh).await?;
        tx.commit().await.map_err(AppError::from)?;
        Ok(closed)
    }

    async fn cancel_for_payment_failure(
        &self,
        subscription: &Subscription,
    ) -> AppResult<(Subscription, u64)> {
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;
        let saved = update_subscription(&mut *tx, subscription).await?;
        let cancelled =
            cancel_ready_for_payment(&mut *tx, subscription.owner_id, subscription.updated_at)
                .await?;
        tx.commit().await.map_err(AppError::from)?;
        Ok((saved, cancelled))
    }
}
