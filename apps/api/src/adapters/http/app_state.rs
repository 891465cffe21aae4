use std::sync::Arc;

use crate::{
    infra::config::AppConfig,
    use_cases::{
        billing_webhook::BillingWebhookUseCases, entitlements::EntitlementUseCases,
        plan_registry::PlanRegistry, usage_meter::UsageMeter,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub webhook_use_cases: Arc<BillingWebhookUseCases>,
    pub plan_registry: Arc<PlanRegistry>,
    pub entitlement_use_cases: Arc<EntitlementUseCases>,
    pub usage_meter: Arc<UsageMeter>,
}
