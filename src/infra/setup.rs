use std::fs::File;
use std::sync::Arc;

use secrecy::ExposeSecret;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    adapters::http::app_state::AppState,
    application::ports::{
        billing_hooks::{BillingHooks, NoopBillingHooks},
        clock::{Clock, SystemClock},
        job_queue::{BillingJob, JobQueue},
        owner_directory::OwnerDirectory,
        payment_gateway::PaymentGatewayPort,
    },
    infra::{
        billing_job_worker::TokioJobQueue,
        config::{AppConfig, GatewayKind},
        db::run_migrations,
        dummy_payment_client::DummyPaymentClient,
        error::InfraError,
        postgres_persistence,
        stripe_payment_adapter::StripeGateway,
    },
    use_cases::{
        billing_cycle::{BillingCycleUseCases, BillingLedgerRepo},
        invoice::{InvoiceRepo, InvoiceUseCases},
        plan_change::{PlanChangeUseCases, SubscriptionPlanRepo},
        subscription::{SubscriptionPeriodRepo, SubscriptionRepo, SubscriptionUseCases},
    },
};

/// Everything `main` needs: the HTTP state and the receiving end of the job queue.
pub struct AppRuntime {
    pub app_state: AppState,
    pub jobs: UnboundedReceiver<BillingJob>,
}

pub async fn init_app_state() -> anyhow::Result<AppRuntime> {
    let config = AppConfig::from_env()?;

    let postgres_arc = Arc::new(postgres_persistence(&config.database_url).await?);
    if config.run_migrations {
        run_migrations(postgres_arc.pool()).await?;
    }

    let gateway: Arc<dyn PaymentGatewayPort> = match config.payment_gateway {
        GatewayKind::Stripe => {
            let secret_key = config
                .stripe_secret_key
                .as_ref()
                .ok_or(InfraError::ConfigMissing {
                    var: "STRIPE_SECRET_KEY",
                })?;
            Arc::new(StripeGateway::new(
                secret_key.expose_secret().to_string(),
                config.stripe_api_base.clone(),
            ))
        }
        GatewayKind::Dummy => Arc::new(DummyPaymentClient::new()),
    };
    tracing::info!(gateway = %config.payment_gateway, "Payment gateway selected");

    let (queue, job_receiver) = TokioJobQueue::channel();
    let jobs: Arc<dyn JobQueue> = Arc::new(queue);
    let hooks: Arc<dyn BillingHooks> = Arc::new(NoopBillingHooks);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let settings = Arc::new(config.billing.clone());

    let subscription_repo = postgres_arc.clone() as Arc<dyn SubscriptionRepo>;
    let period_repo = postgres_arc.clone() as Arc<dyn SubscriptionPeriodRepo>;
    let invoice_repo = postgres_arc.clone() as Arc<dyn InvoiceRepo>;
    let plan_repo = postgres_arc.clone() as Arc<dyn SubscriptionPlanRepo>;
    let ledger = postgres_arc.clone() as Arc<dyn BillingLedgerRepo>;
    let owners = postgres_arc.clone() as Arc<dyn OwnerDirectory>;

    let subscriptions = Arc::new(SubscriptionUseCases::new(
        subscription_repo.clone(),
        period_repo.clone(),
        invoice_repo.clone(),
        plan_repo.clone(),
        ledger.clone(),
        owners.clone(),
        hooks.clone(),
        clock.clone(),
        settings.clone(),
    ));
    let invoices = Arc::new(InvoiceUseCases::new(
        invoice_repo.clone(),
        subscription_repo.clone(),
        ledger.clone(),
        subscriptions.clone(),
        owners.clone(),
        gateway,
        jobs.clone(),
        hooks.clone(),
        clock.clone(),
        settings.clone(),
    ));
    let cycles = Arc::new(BillingCycleUseCases::new(
        subscription_repo.clone(),
        period_repo.clone(),
        invoice_repo,
        ledger,
        subscriptions.clone(),
        invoices.clone(),
        owners,
        jobs,
        hooks,
        clock.clone(),
        settings.clone(),
    ));
    let plans = Arc::new(PlanChangeUseCases::new(
        plan_repo,
        subscription_repo,
        period_repo,
        subscriptions.clone(),
        cycles.clone(),
        clock,
        settings,
    ));

    Ok(AppRuntime {
        app_state: AppState {
            config: Arc::new(config),
            subscriptions,
            invoices,
            cycles,
            plans,
        },
        jobs: job_receiver,
    })
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "recurring_billing=debug,tower_http=info".into());

    // Console (pretty logs)
    let console_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .pretty();

    // File (structured JSON logs), skipped when the file can't be created.
    let json_layer = File::create("billing.log").ok().map(|file| {
        fmt::layer()
            .json()
            .with_writer(Arc::new(file))
            .with_current_span(true)
            .with_span_list(true)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
}
