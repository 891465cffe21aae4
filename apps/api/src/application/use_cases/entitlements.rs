//! What an owner may do right now: effective plan, usage and gate decisions.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use donelog_types::{
    FeatureKey, GateDecision, Limit, Owner, PlanFeatures, SubscriptionStatus, UsageMetric,
    evaluate,
};
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::{
    bounded, plan_registry::PlanRegistry, subscription_reconciler::SubscriptionRepoTrait,
    usage_meter::UsageMeter,
};
use crate::{
    app_error::{AppError, AppResult},
    domain::entities::{
        plan::PlanProfile, subscription::SubscriptionProfile, usage_period::UsagePeriod,
    },
};

#[derive(Debug, Clone, Serialize)]
pub struct MetricUsage {
    pub metric: UsageMetric,
    pub used: u64,
    pub limit: Option<Limit>,
    pub decision: GateDecision,
}

#[derive(Debug, Clone, Serialize)]
pub struct Entitlements {
    pub owner: Owner,
    pub plan: String,
    pub plan_display_name: String,
    /// `None` when the owner never subscribed.
    pub status: Option<SubscriptionStatus>,
    pub cancel_at_period_end: bool,
    pub features: PlanFeatures,
    pub period: UsagePeriod,
    pub usage: Vec<MetricUsage>,
}

#[derive(Clone)]
pub struct EntitlementUseCases {
    plans: Arc<PlanRegistry>,
    subscriptions: Arc<dyn SubscriptionRepoTrait>,
    usage: Arc<UsageMeter>,
    store_timeout: Duration,
}

impl EntitlementUseCases {
    pub fn new(
        plans: Arc<PlanRegistry>,
        subscriptions: Arc<dyn SubscriptionRepoTrait>,
        usage: Arc<UsageMeter>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            plans,
            subscriptions,
            usage,
            store_timeout,
        }
    }

    /// The subscription row (if any) and the plan it entitles the owner to.
    ///
    /// Cancelled rows and rows whose plan vanished from the catalog evaluate
    /// against the free plan.
    async fn effective_plan(
        &self,
        owner: Owner,
    ) -> AppResult<(Option<SubscriptionProfile>, PlanProfile)> {
        let sub = bounded(self.store_timeout, self.subscriptions.get_by_owner(owner)).await?;

        let plan = match &sub {
            Some(row) if row.status.grants_plan() && !row.is_terminated() => {
                match self.plans.get(&row.plan_name).await? {
                    Some(plan) => plan,
                    None => {
                        warn!(
                            owner = %owner,
                            plan = %row.plan_name,
                            "Subscription references unknown plan, using free plan"
                        );
                        self.plans.free_plan().await?
                    }
                }
            }
            _ => self.plans.free_plan().await?,
        };
        Ok((sub, plan))
    }

    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn get(&self, owner: Owner) -> AppResult<Entitlements> {
        let (sub, plan) = self.effective_plan(owner).await?;
        let period = UsagePeriod::for_subscription(sub.as_ref(), Utc::now());

        let mut usage = Vec::with_capacity(UsageMetric::ALL.len());
        for metric in UsageMetric::ALL {
            let snapshot = self.usage.current_in(owner, metric, period).await?;
            let key = metric.feature_key();
            usage.push(MetricUsage {
                metric,
                used: snapshot.count,
                limit: plan.features.limit(key),
                decision: evaluate(&plan.features, key, snapshot.count),
            });
        }

        Ok(Entitlements {
            owner,
            plan: plan.name,
            plan_display_name: plan.display_name,
            status: sub.as_ref().map(|s| s.status),
            cancel_at_period_end: sub.as_ref().is_some_and(|s| s.cancel_at_period_end),
            features: plan.features,
            period,
            usage,
        })
    }

    /// Gate one action.
    ///
    /// Metered features read the current counter unless `current_usage` is
    /// given; other limits use `current_usage` (default 0). A denial is
    /// returned as [`AppError::UpgradeRequired`].
    #[instrument(skip(self), fields(owner = %owner, feature = %feature))]
    pub async fn check(
        &self,
        owner: Owner,
        feature: FeatureKey,
        current_usage: Option<u64>,
    ) -> AppResult<GateDecision> {
        let (sub, plan) = self.effective_plan(owner).await?;

        let used = match (current_usage, UsageMetric::for_feature(feature)) {
            (Some(used), _) => used,
            (None, Some(metric)) => {
                let period = UsagePeriod::for_subscription(sub.as_ref(), Utc::now());
                self.usage.current_in(owner, metric, period).await?.count
            }
            (None, None) => 0,
        };

        match evaluate(&plan.features, feature, used) {
            GateDecision::UpgradeRequired => {
                info!(plan = %plan.name, used, "Feature denied, upgrade required");
                Err(AppError::UpgradeRequired { feature })
            }
            decision => Ok(decision),
        }
    }
}
