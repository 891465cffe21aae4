use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::usage_meter::{UsageCounterRepoTrait, UsageKey},
};

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[async_trait]
impl UsageCounterRepoTrait for PostgresPersistence {
    async fn increment(&self, key: &UsageKey, period_end: DateTime<Utc>) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO usage_counters (owner_kind, owner_id, metric, period_start, period_end, count)
            VALUES ($1, $2, $3, $4, $5, 1)
            ON CONFLICT (owner_kind, owner_id, metric, period_start)
            DO UPDATE SET count = usage_counters.count + 1, updated_at = NOW()
            RETURNING count
            "#,
        )
        .bind(key.owner.kind.as_ref())
        .bind(key.owner.id)
        .bind(key.metric.as_ref())
        .bind(key.period_start)
        .bind(period_end)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(to_count(count))
    }

    async fn current(&self, key: &UsageKey) -> AppResult<u64> {
        let count: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT count FROM usage_counters
            WHERE owner_kind = $1 AND owner_id = $2 AND metric = $3 AND period_start = $4
            "#,
        )
        .bind(key.owner.kind.as_ref())
        .bind(key.owner.id)
        .bind(key.metric.as_ref())
        .bind(key.period_start)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(count.map(to_count).unwrap_or(0))
    }

    async fn set_count(
        &self,
        key: &UsageKey,
        period_end: DateTime<Utc>,
        count: u64,
    ) -> AppResult<u64> {
        let count = i64::try_from(count)
            .map_err(|_| AppError::InvalidInput("count out of range".into()))?;
        let stored: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO usage_counters (owner_kind, owner_id, metric, period_start, period_end, count)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (owner_kind, owner_id, metric, period_start)
            DO UPDATE SET count = EXCLUDED.count, updated_at = NOW()
            RETURNING count
            "#,
        )
        .bind(key.owner.kind.as_ref())
        .bind(key.owner.id)
        .bind(key.metric.as_ref())
        .bind(key.period_start)
        .bind(period_end)
        .bind(count)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(to_count(stored))
    }
}
