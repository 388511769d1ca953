use std::net::SocketAddr;
use std::time::Duration;

use chrono_tz::Tz;
use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;
use strum::{AsRefStr, Display, EnumString};

use crate::{application::settings::BillingSettings, domain::money::TaxRateTable, infra::error::InfraError};

/// Which card processor the engine talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum GatewayKind {
    Stripe,
    Dummy,
}

pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    /// Bearer token required on every admin route.
    pub admin_api_token: SecretString,
    pub payment_gateway: GatewayKind,
    pub stripe_secret_key: Option<SecretString>,
    pub stripe_api_base: String,
    pub run_migrations: bool,
    pub cycle_sweep_interval: Duration,
    pub retry_sweep_interval: Duration,
    pub max_concurrent_jobs: usize,
    pub billing: BillingSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, InfraError> {
        let database_url: String = get_env("DATABASE_URL");
        let bind_addr: SocketAddr = get_env_default(
            "BIND_ADDR",
            SocketAddr::from(([127, 0, 0, 1], 3001)),
        );
        let admin_api_token = SecretString::new(get_env::<String>("ADMIN_API_TOKEN").into());

        let payment_gateway: GatewayKind = get_env_default("PAYMENT_GATEWAY", GatewayKind::Dummy);
        let stripe_secret_key = std::env::var("STRIPE_SECRET_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .map(|key| SecretString::new(key.into()));
        if payment_gateway == GatewayKind::Stripe && stripe_secret_key.is_none() {
            return Err(InfraError::ConfigMissing {
                var: "STRIPE_SECRET_KEY",
            });
        }
        let stripe_api_base = parse_api_base(&get_env_default(
            "STRIPE_API_BASE",
            crate::infra::stripe_client::STRIPE_API_BASE.to_string(),
        ))?;

        let run_migrations: bool = get_env_default("RUN_MIGRATIONS", true);
        let cycle_sweep_interval_secs: u64 = get_env_default("CYCLE_SWEEP_INTERVAL_SECS", 3600);
        let retry_sweep_interval_secs: u64 = get_env_default("RETRY_SWEEP_INTERVAL_SECS", 3600);
        let max_concurrent_jobs: usize = get_env_default("MAX_CONCURRENT_JOBS", 4);

        let defaults = BillingSettings::default();
        let gateway_timeout_secs: u64 = get_env_default("GATEWAY_TIMEOUT_SECS", 30);
        let billing = BillingSettings {
            currency: get_env_default("BILLING_CURRENCY", defaults.currency),
            trial_days: get_env_default("TRIAL_DAYS", defaults.trial_days),
            anchor_tz: parse_anchor_tz(&get_env_default(
                "BILLING_ANCHOR_TZ",
                defaults.anchor_tz.name().to_string(),
            ))?,
            max_overdue_days: get_env_default("MAX_OVERDUE_DAYS", defaults.max_overdue_days),
            unsuspend_window_days: get_env_default(
                "UNSUSPEND_WINDOW_DAYS",
                defaults.unsuspend_window_days,
            ),
            suspend_after_failed_attempts: get_env_default(
                "SUSPEND_AFTER_FAILED_ATTEMPTS",
                defaults.suspend_after_failed_attempts,
            ),
            gateway_timeout: Duration::from_secs(gateway_timeout_secs),
            tax_rates: parse_tax_rates(&get_env_default("TAX_RATES", "{}".to_string()))?,
        };

        Ok(Self {
            database_url,
            bind_addr,
            admin_api_token,
            payment_gateway,
            stripe_secret_key,
            stripe_api_base,
            run_migrations,
            cycle_sweep_interval: Duration::from_secs(cycle_sweep_interval_secs.max(1)),
            retry_sweep_interval: Duration::from_secs(retry_sweep_interval_secs.max(1)),
            max_concurrent_jobs: max_concurrent_jobs.max(1),
            billing,
        })
    }
}

fn parse_api_base(raw: &str) -> Result<String, InfraError> {
    let parsed = url::Url::parse(raw).map_err(|e| InfraError::ConfigInvalid {
        var: "STRIPE_API_BASE",
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(InfraError::ConfigInvalid {
            var: "STRIPE_API_BASE",
            reason: format!("unsupported scheme {}", parsed.scheme()),
        });
    }
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

fn parse_anchor_tz(raw: &str) -> Result<Tz, InfraError> {
    raw.parse::<Tz>().map_err(|e| InfraError::ConfigInvalid {
        var: "BILLING_ANCHOR_TZ",
        reason: e.to_string(),
    })
}

/// `TAX_RATES` is a JSON object of state code to decimal rate, e.g. `{"TX": "0.0825"}`.
fn parse_tax_rates(raw: &str) -> Result<TaxRateTable, InfraError> {
    TaxRateTable::from_json(raw).map_err(|e| InfraError::ConfigInvalid {
        var: "TAX_RATES",
        reason: e.to_string(),
    })
}
