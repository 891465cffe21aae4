use std::net::SocketAddr;
use std::time::Duration;

use axum::http::HeaderValue;
use env_helpers::get_env_default;
use secrecy::SecretString;
use strum::{AsRefStr, EnumString};
use url::Url;

use super::InfraError;

/// Where usage counters live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum UsageBackend {
    Postgres,
    Redis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    Pretty,
    Json,
}

pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub cors_origin: HeaderValue,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
    pub db_statement_timeout: Duration,
    pub redis_url: String,
    pub usage_backend: UsageBackend,
    /// Signing secret of the user billing webhook endpoint.
    pub stripe_webhook_secret: SecretString,
    /// Signing secret of the team billing webhook endpoint. Defaults to the user secret.
    pub stripe_team_webhook_secret: SecretString,
    pub stripe_secret_key: SecretString,
    pub stripe_api_base: Url,
    pub provider_timeout: Duration,
    pub webhook_tolerance: Duration,
    pub webhook_event_retention_days: i64,
    /// Bearer token the application presents on the internal API.
    pub internal_api_token: SecretString,
    pub free_plan_name: String,
    pub store_timeout: Duration,
    pub log_format: LogFormat,
}

/// A required, non-empty variable.
fn required(var: &'static str) -> Result<String, InfraError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(InfraError::ConfigMissing { var }),
    }
}

fn parsed<T: std::str::FromStr>(var: &'static str, default: &str) -> Result<T, InfraError> {
    get_env_default(var, default.to_string())
        .parse()
        .map_err(|_| InfraError::ConfigInvalid { var })
}

impl AppConfig {
    pub fn from_env() -> Result<Self, InfraError> {
        let bind_addr: SocketAddr = parsed("BIND_ADDR", "127.0.0.1:3001")?;
        let cors_origin: HeaderValue = parsed("CORS_ORIGIN", "http://localhost:3000")?;

        let database_url = required("DATABASE_URL")?;
        let db_max_connections: u32 = get_env_default("DB_MAX_CONNECTIONS", 10);
        let db_acquire_timeout_secs: u64 = get_env_default("DB_ACQUIRE_TIMEOUT_SECS", 5);
        let db_statement_timeout_ms: u64 = get_env_default("DB_STATEMENT_TIMEOUT_MS", 5_000);

        let redis_url: String = get_env_default("REDIS_URL", "redis://127.0.0.1:6379".to_string());
        let usage_backend: UsageBackend = parsed("USAGE_BACKEND", "postgres")?;

        let stripe_webhook_secret = required("STRIPE_WEBHOOK_SECRET")?;
        let stripe_team_webhook_secret = std::env::var("STRIPE_TEAM_WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| stripe_webhook_secret.clone());
        let stripe_secret_key = required("STRIPE_SECRET_KEY")?;
        let stripe_api_base: Url = parsed("STRIPE_API_BASE", "https://api.stripe.com/v1/")?;
        let provider_timeout_secs: u64 = get_env_default("PROVIDER_TIMEOUT_SECS", 10);
        let webhook_tolerance_secs: u64 = get_env_default("WEBHOOK_TOLERANCE_SECS", 300);
        let webhook_event_retention_days: i64 = get_env_default("WEBHOOK_EVENT_RETENTION_DAYS", 30);

        let internal_api_token = required("INTERNAL_API_TOKEN")?;
        let free_plan_name: String = get_env_default("FREE_PLAN_NAME", "free".to_string());
        let store_timeout_ms: u64 = get_env_default("STORE_TIMEOUT_MS", 5_000);
        let log_format: LogFormat = parsed("LOG_FORMAT", "pretty")?;

        Ok(Self {
            bind_addr,
            cors_origin,
            database_url,
            db_max_connections,
            db_acquire_timeout: Duration::from_secs(db_acquire_timeout_secs),
            db_statement_timeout: Duration::from_millis(db_statement_timeout_ms),
            redis_url,
            usage_backend,
            stripe_webhook_secret: SecretString::new(stripe_webhook_secret.into()),
            stripe_team_webhook_secret: SecretString::new(stripe_team_webhook_secret.into()),
            stripe_secret_key: SecretString::new(stripe_secret_key.into()),
            stripe_api_base,
            provider_timeout: Duration::from_secs(provider_timeout_secs),
            webhook_tolerance: Duration::from_secs(webhook_tolerance_secs),
            webhook_event_retention_days,
            internal_api_token: SecretString::new(internal_api_token.into()),
            free_plan_name,
            store_timeout: Duration::from_millis(store_timeout_ms),
            log_format,
        })
    }
}
