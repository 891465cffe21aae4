//! Test app state builder for HTTP-level integration testing.
//!
//! `TestAppStateBuilder` wires the real use cases over in-memory repositories
//! and a stub billing provider, so route tests exercise the same code paths
//! as production without Postgres or Stripe.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use secrecy::SecretString;
use url::Url;

use crate::{
    adapters::http::app_state::AppState,
    domain::entities::subscription::SubscriptionProfile,
    infra::config::{AppConfig, LogFormat, UsageBackend},
    test_utils::{
        InMemorySubscriptionEventRepo, InMemorySubscriptionPlanRepo, InMemorySubscriptionRepo,
        InMemoryUsageCounterRepo, InMemoryWebhookEventRepo, StubBillingProvider, standard_plans,
    },
    use_cases::{
        billing_webhook::{BillingWebhookUseCases, WebhookSecrets},
        entitlements::EntitlementUseCases,
        plan_registry::PlanRegistry,
        subscription_reconciler::SubscriptionReconciler,
        usage_meter::UsageMeter,
        webhook_verifier::WebhookVerifier,
    },
};

pub const TEST_USER_WEBHOOK_SECRET: &str = "whsec_test_user";
pub const TEST_TEAM_WEBHOOK_SECRET: &str = "whsec_test_team";
pub const TEST_INTERNAL_TOKEN: &str = "internal_test_token";

const TEST_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// State plus handles on the in-memory stores a test may want to inspect.
pub struct TestHarness {
    pub app_state: AppState,
    pub subscriptions: Arc<InMemorySubscriptionRepo>,
    pub ledger: Arc<InMemoryWebhookEventRepo>,
}

#[derive(Default)]
pub struct TestAppStateBuilder {
    subscriptions: Vec<SubscriptionProfile>,
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscription(mut self, subscription: SubscriptionProfile) -> Self {
        self.subscriptions.push(subscription);
        self
    }

    pub fn build(self) -> TestHarness {
        let config = test_config();

        let subscriptions = Arc::new(InMemorySubscriptionRepo::with_subscriptions(
            self.subscriptions,
        ));
        let ledger = Arc::new(InMemoryWebhookEventRepo::new());

        let plan_registry = Arc::new(PlanRegistry::new(
            Arc::new(InMemorySubscriptionPlanRepo::with_plans(standard_plans())),
            config.free_plan_name.clone(),
            TEST_STORE_TIMEOUT,
        ));

        let reconciler = Arc::new(SubscriptionReconciler::new(
            subscriptions.clone(),
            Arc::new(InMemorySubscriptionEventRepo::new()),
            plan_registry.clone(),
            Arc::new(StubBillingProvider::new()),
            TEST_STORE_TIMEOUT,
        ));

        let webhook_use_cases = Arc::new(BillingWebhookUseCases::new(
            WebhookVerifier::default(),
            WebhookSecrets {
                user: config.stripe_webhook_secret.clone(),
                team: config.stripe_team_webhook_secret.clone(),
            },
            ledger.clone(),
            reconciler,
            TEST_STORE_TIMEOUT,
        ));

        let usage_meter = Arc::new(UsageMeter::new(
            Arc::new(InMemoryUsageCounterRepo::new()),
            subscriptions.clone(),
            TEST_STORE_TIMEOUT,
        ));

        let entitlement_use_cases = Arc::new(EntitlementUseCases::new(
            plan_registry.clone(),
            subscriptions.clone(),
            usage_meter.clone(),
            TEST_STORE_TIMEOUT,
        ));

        let app_state = AppState {
            config: Arc::new(config),
            webhook_use_cases,
            plan_registry,
            entitlement_use_cases,
            usage_meter,
        };

        TestHarness {
            app_state,
            subscriptions,
            ledger,
        }
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        cors_origin: HeaderValue::from_static("http://localhost:3000"),
        database_url: "postgres://localhost/donelog_test".to_string(),
        db_max_connections: 1,
        db_acquire_timeout: Duration::from_secs(1),
        db_statement_timeout: Duration::from_secs(1),
        redis_url: "redis://127.0.0.1:6379".to_string(),
        usage_backend: UsageBackend::Postgres,
        stripe_webhook_secret: SecretString::new(TEST_USER_WEBHOOK_SECRET.into()),
        stripe_team_webhook_secret: SecretString::new(TEST_TEAM_WEBHOOK_SECRET.into()),
        stripe_secret_key: SecretString::new("sk_test_123".into()),
        stripe_api_base: Url::parse("http://127.0.0.1:9/v1/").unwrap(),
        provider_timeout: Duration::from_secs(1),
        webhook_tolerance: Duration::from_secs(300),
        webhook_event_retention_days: 30,
        internal_api_token: SecretString::new(TEST_INTERNAL_TOKEN.into()),
        free_plan_name: "free".to_string(),
        store_timeout: TEST_STORE_TIMEOUT,
        log_format: LogFormat::Pretty,
    }
}
