use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use donelog_types::PlanFeatures;
use tracing::{error, info, instrument};

use super::bounded;
use crate::{
    app_error::{AppError, AppResult},
    domain::entities::plan::PlanProfile,
    validators::{is_valid_currency, is_valid_plan_name},
};

#[derive(Debug, Clone)]
pub struct UpsertPlanInput {
    pub name: String,
    pub display_name: String,
    pub price_monthly_cents: i64,
    pub price_yearly_cents: i64,
    pub currency: String,
    pub stripe_price_id_monthly: Option<String>,
    pub stripe_price_id_yearly: Option<String>,
    pub features: PlanFeatures,
    pub is_active: bool,
}

#[async_trait]
pub trait SubscriptionPlanRepoTrait: Send + Sync {
    /// Any plan, active or not.
    async fn get_by_name(&self, name: &str) -> AppResult<Option<PlanProfile>>;
    /// Matches either the monthly or the yearly price id, active or not.
    async fn get_by_stripe_price_id(&self, price_id: &str) -> AppResult<Option<PlanProfile>>;
    async fn list_active(&self) -> AppResult<Vec<PlanProfile>>;
    async fn upsert(&self, input: &UpsertPlanInput) -> AppResult<PlanProfile>;
    /// Returns `None` when no plan has that name.
    async fn set_active(&self, name: &str, is_active: bool) -> AppResult<Option<PlanProfile>>;
}

/// Catalog of plans and their feature maps.
#[derive(Clone)]
pub struct PlanRegistry {
    repo: Arc<dyn SubscriptionPlanRepoTrait>,
    free_plan_name: String,
    store_timeout: Duration,
}

impl PlanRegistry {
    pub fn new(
        repo: Arc<dyn SubscriptionPlanRepoTrait>,
        free_plan_name: impl Into<String>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            free_plan_name: free_plan_name.into(),
            store_timeout,
        }
    }

    pub fn free_plan_name(&self) -> &str {
        &self.free_plan_name
    }

    pub async fn get(&self, name: &str) -> AppResult<Option<PlanProfile>> {
        bounded(self.store_timeout, self.repo.get_by_name(name)).await
    }

    pub async fn require(&self, name: &str) -> AppResult<PlanProfile> {
        self.get(name).await?.ok_or(AppError::NotFound)
    }

    /// Resolve a plan from a subscription line item's price id.
    pub async fn resolve_price(&self, price_id: &str) -> AppResult<Option<PlanProfile>> {
        bounded(self.store_timeout, self.repo.get_by_stripe_price_id(price_id)).await
    }

    /// Active plans, as shown in the public catalog.
    pub async fn list_public(&self) -> AppResult<Vec<PlanProfile>> {
        bounded(self.store_timeout, self.repo.list_active()).await
    }

    /// The plan every owner without a live paid subscription is evaluated against.
    ///
    /// A missing free plan is a deployment error. Entitlement reads fail with
    /// `Internal` rather than guess at a feature map.
    pub async fn free_plan(&self) -> AppResult<PlanProfile> {
        match self.get(&self.free_plan_name).await? {
            Some(plan) => Ok(plan),
            None => {
                error!(plan = %self.free_plan_name, "Free plan missing from catalog");
                Err(AppError::Internal(format!(
                    "free plan {:?} missing from catalog",
                    self.free_plan_name
                )))
            }
        }
    }

    #[instrument(skip(self, input), fields(plan = %input.name))]
    pub async fn upsert(&self, input: &UpsertPlanInput) -> AppResult<PlanProfile> {
        if !is_valid_plan_name(&input.name) {
            return Err(AppError::InvalidInput(format!(
                "Invalid plan name {:?}",
                input.name
            )));
        }
        if !is_valid_currency(&input.currency) {
            return Err(AppError::InvalidInput(format!(
                "Invalid currency {:?}",
                input.currency
            )));
        }
        if input.price_monthly_cents < 0 || input.price_yearly_cents < 0 {
            return Err(AppError::InvalidInput("Prices cannot be negative".into()));
        }
        if !input.is_active && input.name == self.free_plan_name {
            return Err(AppError::InvalidInput(
                "The free plan cannot be deactivated".into(),
            ));
        }

        let plan = bounded(self.store_timeout, self.repo.upsert(input)).await?;
        info!(plan = %plan.name, is_active = plan.is_active, "Plan upserted");
        Ok(plan)
    }

    /// Hide a plan from the catalog. Existing subscriptions keep resolving it.
    #[instrument(skip(self))]
    pub async fn deactivate(&self, name: &str) -> AppResult<PlanProfile> {
        if name == self.free_plan_name {
            return Err(AppError::InvalidInput(
                "The free plan cannot be deactivated".into(),
            ));
        }
        let plan = bounded(self.store_timeout, self.repo.set_active(name, false))
            .await?
            .ok_or(AppError::NotFound)?;
        info!(plan = %plan.name, "Plan deactivated");
        Ok(plan)
    }
}
