use secrecy::Secret;
use service_core::config as core_config;
use service_core::config::get_env;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: Option<DatabaseConfig>,
    pub security: SecurityConfig,
    pub webhook: WebhookConfig,
    pub invoicing: InvoicingConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub admin_api_key: Secret<String>,
    pub service_api_key: Secret<String>,
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub secret: Secret<String>,
    pub tolerance_secs: i64,
}

#[derive(Debug, Clone)]
pub struct InvoicingConfig {
    pub notify_url: Option<String>,
    pub due_days: i64,
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

/// Longest payment term accepted from `INVOICE_DUE_DAYS`.
pub const MAX_DUE_DAYS: i64 = 3650;

fn due_days_env(is_prod: bool) -> Result<i64, AppError> {
    let days: i64 = parse_env("INVOICE_DUE_DAYS", "30", is_prod)?;
    if !(0..=MAX_DUE_DAYS).contains(&days) {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "INVOICE_DUE_DAYS must be between 0 and {}, got {}",
            MAX_DUE_DAYS,
            days
        )));
    }
    Ok(days)
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl BillingConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = common.is_production();

        // Without a database URL the service runs on the in-memory store,
        // which is only acceptable outside production.
        let database = match optional_env("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url: Secret::new(url),
                max_connections: parse_env("DB_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DB_MIN_CONNECTIONS", "1", is_prod)?,
            }),
            None if is_prod => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "DATABASE_URL is required in production but not set"
                )))
            }
            None => None,
        };

        Ok(BillingConfig {
            service_name: get_env("SERVICE_NAME", Some("usage-billing-service"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some(common.log_level.as_str()), is_prod)?,
            otlp_endpoint: optional_env("OTLP_ENDPOINT"),
            database,
            security: SecurityConfig {
                admin_api_key: Secret::new(get_env(
                    "ADMIN_API_KEY",
                    Some("dev-admin-key"),
                    is_prod,
                )?),
                service_api_key: Secret::new(get_env(
                    "SERVICE_API_KEY",
                    Some("dev-service-key"),
                    is_prod,
                )?),
            },
            webhook: WebhookConfig {
                secret: Secret::new(get_env(
                    "PAYMENT_WEBHOOK_SECRET",
                    Some("dev-webhook-secret"),
                    is_prod,
                )?),
                tolerance_secs: parse_env("PAYMENT_WEBHOOK_TOLERANCE_SECS", "300", is_prod)?,
            },
            invoicing: InvoicingConfig {
                notify_url: optional_env("INVOICE_NOTIFY_URL"),
                due_days: due_days_env(is_prod)?,
            },
            common,
        })
    }

    /// Development defaults with the in-memory store. Used by tests.
    pub fn local(
        admin_api_key: &str,
        service_api_key: &str,
        webhook_secret: &str,
    ) -> Self {
        BillingConfig {
            common: core_config::Config {
                port: 0,
                ..Default::default()
            },
            service_name: "usage-billing-service".to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            database: None,
            security: SecurityConfig {
                admin_api_key: Secret::new(admin_api_key.to_string()),
                service_api_key: Secret::new(service_api_key.to_string()),
            },
            webhook: WebhookConfig {
                secret: Secret::new(webhook_secret.to_string()),
                tolerance_secs: 300,
            },
            invoicing: InvoicingConfig {
                notify_url: None,
                due_days: 30,
            },
        }
    }
}
