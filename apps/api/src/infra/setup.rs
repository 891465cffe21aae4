use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    adapters::{http::app_state::AppState, persistence::PostgresPersistence},
    infra::{
        InfraError,
        config::{AppConfig, LogFormat, UsageBackend},
        db::{DbSettings, init_db},
        redis_usage::RedisUsageStore,
        stripe_client::StripeClient,
    },
    use_cases::{
        billing_webhook::{BillingWebhookUseCases, WebhookSecrets},
        entitlements::EntitlementUseCases,
        plan_registry::PlanRegistry,
        subscription_reconciler::{SubscriptionEventRepoTrait, SubscriptionReconciler, SubscriptionRepoTrait},
        usage_meter::{UsageCounterRepoTrait, UsageMeter},
        webhook_verifier::WebhookVerifier,
    },
};

pub async fn init_app_state(config: AppConfig) -> Result<AppState, InfraError> {
    let pool = init_db(
        &config.database_url,
        &DbSettings {
            max_connections: config.db_max_connections,
            acquire_timeout: config.db_acquire_timeout,
            statement_timeout: config.db_statement_timeout,
        },
    )
    .await?;
    let postgres = Arc::new(PostgresPersistence::new(pool));

    let subscriptions = postgres.clone() as Arc<dyn SubscriptionRepoTrait>;
    let counters: Arc<dyn UsageCounterRepoTrait> = match config.usage_backend {
        UsageBackend::Postgres => postgres.clone(),
        UsageBackend::Redis => Arc::new(RedisUsageStore::new(&config.redis_url).await?),
    };
    info!(backend = config.usage_backend.as_ref(), "Usage counter store selected");

    let provider = Arc::new(StripeClient::new(
        config.stripe_secret_key.clone(),
        config.stripe_api_base.clone(),
        config.provider_timeout,
    )?);

    let plan_registry = Arc::new(PlanRegistry::new(
        postgres.clone(),
        config.free_plan_name.clone(),
        config.store_timeout,
    ));

    let reconciler = Arc::new(SubscriptionReconciler::new(
        subscriptions.clone(),
        postgres.clone() as Arc<dyn SubscriptionEventRepoTrait>,
        plan_registry.clone(),
        provider,
        config.store_timeout,
    ));

    let webhook_use_cases = Arc::new(BillingWebhookUseCases::new(
        WebhookVerifier::new(config.webhook_tolerance),
        WebhookSecrets {
            user: config.stripe_webhook_secret.clone(),
            team: config.stripe_team_webhook_secret.clone(),
        },
        postgres.clone(),
        reconciler,
        config.store_timeout,
    ));

    let usage_meter = Arc::new(UsageMeter::new(
        counters,
        subscriptions.clone(),
        config.store_timeout,
    ));

    let entitlement_use_cases = Arc::new(EntitlementUseCases::new(
        plan_registry.clone(),
        subscriptions,
        usage_meter.clone(),
        config.store_timeout,
    ));

    Ok(AppState {
        config: Arc::new(config),
        webhook_use_cases,
        plan_registry,
        entitlement_use_cases,
        usage_meter,
    })
}

pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "donelog_api=debug,tower_http=info".into());

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false).with_level(true).pretty())
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init(),
    };
    result.ok();
}
