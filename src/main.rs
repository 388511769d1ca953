use dotenvy::dotenv;
use tracing::info;

use recurring_billing::infra::{
    app::create_app,
    billing_job_worker::{BillingJobRunner, run_billing_job_worker},
    billing_scheduler::run_billing_scheduler,
    setup::{AppRuntime, init_app_state},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let AppRuntime { app_state, jobs } = init_app_state().await?;

    let bind_addr = app_state.config.bind_addr;

    let app = create_app(app_state.clone());

    // Background tasks start after tracing is initialized by create_app.
    let runner = BillingJobRunner::new(app_state.cycles.clone(), app_state.invoices.clone());
    let max_concurrent_jobs = app_state.config.max_concurrent_jobs;
    tokio::spawn(async move {
        run_billing_job_worker(jobs, runner, max_concurrent_jobs).await;
    });

    let cycles = app_state.cycles.clone();
    let invoices = app_state.invoices.clone();
    let cycle_every = app_state.config.cycle_sweep_interval;
    let retry_every = app_state.config.retry_sweep_interval;
    tokio::spawn(async move {
        run_billing_scheduler(cycles, invoices, cycle_every, retry_every).await;
    });

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Billing admin API listening at {}", &listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
