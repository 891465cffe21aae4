use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Script, aio::ConnectionManager};

use super::InfraError;
use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::usage_meter::{UsageCounterRepoTrait, UsageKey},
};

/// Counters outlive their period by this long so late reads still see them.
const EXPIRY_GRACE_SECS: i64 = 7 * 24 * 3600;

/// Atomic increment that pins the key's expiry to the end of its period.
/// Returns the new count.
const INCR_WITH_EXPIREAT_SCRIPT: &str = r#"
local current = redis.call('INCR', KEYS[1])
if current == 1 or redis.call('TTL', KEYS[1]) == -1 then
    redis.call('EXPIREAT', KEYS[1], ARGV[1])
end
return current
"#;

/// Redis-backed usage counters.
#[derive(Clone)]
pub struct RedisUsageStore {
    manager: ConnectionManager,
    script: Script,
}

impl RedisUsageStore {
    pub async fn new(redis_url: &str) -> Result<Self, InfraError> {
        let client = redis::Client::open(redis_url).map_err(InfraError::RedisConnection)?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(InfraError::RedisConnection)?;
        Ok(Self {
            manager,
            script: Script::new(INCR_WITH_EXPIREAT_SCRIPT),
        })
    }
}

fn redis_key(key: &UsageKey) -> String {
    format!(
        "usage:{}:{}:{}:{}",
        key.owner.kind,
        key.owner.id,
        key.metric,
        key.period_start.timestamp()
    )
}

fn expires_at(period_end: DateTime<Utc>) -> i64 {
    period_end.timestamp().saturating_add(EXPIRY_GRACE_SECS)
}

fn redis_error(e: redis::RedisError) -> AppError {
    tracing::error!(error = %e, "Redis usage store error");
    AppError::Database("Usage store operation failed".into())
}

#[async_trait]
impl UsageCounterRepoTrait for RedisUsageStore {
    async fn increment(&self, key: &UsageKey, period_end: DateTime<Utc>) -> AppResult<u64> {
        let mut conn = self.manager.clone();
        self.script
            .key(redis_key(key))
            .arg(expires_at(period_end))
            .invoke_async(&mut conn)
            .await
            .map_err(redis_error)
    }

    async fn current(&self, key: &UsageKey) -> AppResult<u64> {
        let mut conn = self.manager.clone();
        let count: Option<u64> = conn.get(redis_key(key)).await.map_err(redis_error)?;
        Ok(count.unwrap_or(0))
    }

    async fn set_count(
        &self,
        key: &UsageKey,
        period_end: DateTime<Utc>,
        count: u64,
    ) -> AppResult<u64> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("SET")
            .arg(redis_key(key))
            .arg(count)
            .arg("EXAT")
            .arg(expires_at(period_end))
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use donelog_types::{Owner, UsageMetric};
    use uuid::Uuid;

    #[test]
    fn test_key_layout() {
        let id = Uuid::nil();
        let key = UsageKey {
            owner: Owner::team(id),
            metric: UsageMetric::Reports,
            period_start: Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
        };
        assert_eq!(
            redis_key(&key),
            "usage:team:00000000-0000-0000-0000-000000000000:reports:1740787200"
        );
    }

    #[test]
    fn test_expiry_extends_past_period_end() {
        let end = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap();
        assert_eq!(expires_at(end), end.timestamp() + EXPIRY_GRACE_SECS);
    }
}
