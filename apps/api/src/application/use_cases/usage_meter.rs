use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use donelog_types::{Owner, UsageMetric};
use serde::Serialize;
use tracing::{info, instrument};

use super::{bounded, subscription_reconciler::SubscriptionRepoTrait};
use crate::{
    app_error::{AppError, AppResult},
    domain::entities::usage_period::UsagePeriod,
};

/// Identity of one counter: owner, metric and the start of its period.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UsageKey {
    pub owner: Owner,
    pub metric: UsageMetric,
    pub period_start: DateTime<Utc>,
}

/// Atomic per-period counters. Implemented by Postgres and Redis.
#[async_trait]
pub trait UsageCounterRepoTrait: Send + Sync {
    /// Add one, creating the counter at 1. Returns the new count.
    async fn increment(&self, key: &UsageKey, period_end: DateTime<Utc>) -> AppResult<u64>;
    /// Zero when the counter does not exist.
    async fn current(&self, key: &UsageKey) -> AppResult<u64>;
    async fn set_count(
        &self,
        key: &UsageKey,
        period_end: DateTime<Utc>,
        count: u64,
    ) -> AppResult<u64>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSnapshot {
    pub metric: UsageMetric,
    pub count: u64,
    pub period: UsagePeriod,
}

#[derive(Clone)]
pub struct UsageMeter {
    counters: Arc<dyn UsageCounterRepoTrait>,
    subscriptions: Arc<dyn SubscriptionRepoTrait>,
    store_timeout: Duration,
}

impl UsageMeter {
    pub fn new(
        counters: Arc<dyn UsageCounterRepoTrait>,
        subscriptions: Arc<dyn SubscriptionRepoTrait>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            counters,
            subscriptions,
            store_timeout,
        }
    }

    /// The window usage is currently counted in for `owner`.
    pub async fn period_for(&self, owner: Owner) -> AppResult<UsagePeriod> {
        let sub = bounded(self.store_timeout, self.subscriptions.get_by_owner(owner)).await?;
        Ok(UsagePeriod::for_subscription(sub.as_ref(), Utc::now()))
    }

    pub async fn increment(&self, owner: Owner, metric: UsageMetric) -> AppResult<UsageSnapshot> {
        let period = self.period_for(owner).await?;
        let key = key(owner, metric, &period);
        let count = bounded(self.store_timeout, self.counters.increment(&key, period.end)).await?;
        Ok(UsageSnapshot {
            metric,
            count,
            period,
        })
    }

    pub async fn current(&self, owner: Owner, metric: UsageMetric) -> AppResult<UsageSnapshot> {
        let period = self.period_for(owner).await?;
        self.current_in(owner, metric, period).await
    }

    /// Read a counter for a period the caller already resolved.
    pub async fn current_in(
        &self,
        owner: Owner,
        metric: UsageMetric,
        period: UsagePeriod,
    ) -> AppResult<UsageSnapshot> {
        let count = bounded(
            self.store_timeout,
            self.counters.current(&key(owner, metric, &period)),
        )
        .await?;
        Ok(UsageSnapshot {
            metric,
            count,
            period,
        })
    }

    /// Administrative correction of the current period's counter.
    #[instrument(skip(self), fields(owner = %owner, metric = %metric))]
    pub async fn correct(
        &self,
        owner: Owner,
        metric: UsageMetric,
        count: u64,
    ) -> AppResult<UsageSnapshot> {
        if i64::try_from(count).is_err() {
            return Err(AppError::InvalidInput("count out of range".into()));
        }
        let period = self.period_for(owner).await?;
        let key = key(owner, metric, &period);
        let count = bounded(
            self.store_timeout,
            self.counters.set_count(&key, period.end, count),
        )
        .await?;
        info!(count, period_start = %period.start, "Usage counter corrected");
        Ok(UsageSnapshot {
            metric,
            count,
            period,
        })
    }
}

fn key(owner: Owner, metric: UsageMetric, period: &UsagePeriod) -> UsageKey {
    UsageKey {
        owner,
        metric,
        period_start: period.start,
    }
}
