use async_trait::async_trait;
use chrono::{DateTime, Utc};
use donelog_types::OwnerKind;
use sqlx::Row;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::billing_webhook::{RecordWebhookEventInput, WebhookEventRepoTrait},
    domain::entities::webhook_event::WebhookEventProfile,
};

fn row_to_profile(row: sqlx::postgres::PgRow) -> WebhookEventProfile {
    let event_id: String = row.get("event_id");
    let owner_kind: Option<String> = row.get("owner_kind");
    let owner_kind = owner_kind.and_then(|kind| match kind.parse::<OwnerKind>() {
        Ok(kind) => Some(kind),
        Err(_) => {
            tracing::warn!(event_id = %event_id, owner_kind = %kind, "Unknown owner kind in ledger");
            None
        }
    });

    WebhookEventProfile {
        event_id,
        event_type: row.get("event_type"),
        outcome: row.get("outcome"),
        owner_kind,
        stripe_subscription_id: row.get("stripe_subscription_id"),
        provider_created_at: row.get("provider_created_at"),
        payload: row.get("payload"),
        received_at: row.get("received_at"),
    }
}

const SELECT_COLS: &str = r#"
    event_id, event_type, outcome, owner_kind, stripe_subscription_id,
    provider_created_at, payload, received_at
"#;

#[async_trait]
impl WebhookEventRepoTrait for PostgresPersistence {
    async fn exists(&self, event_id: &str) -> AppResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM webhook_events WHERE event_id = $1)")
                .bind(event_id)
                .fetch_one(&self.pool)
                .await
                .map_err(AppError::from)?;
        Ok(exists)
    }

    async fn record(&self, input: &RecordWebhookEventInput) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO webhook_events
                (event_id, event_type, outcome, owner_kind, stripe_subscription_id,
                 provider_created_at, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&input.event_id)
        .bind(&input.event_type)
        .bind(input.outcome)
        .bind(input.owner_kind.map(|k| k.to_string()))
        .bind(&input.stripe_subscription_id)
        .bind(input.provider_created_at)
        .bind(&input.payload)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn list_deferred(
        &self,
        kind: OwnerKind,
        stripe_subscription_id: &str,
    ) -> AppResult<Vec<WebhookEventProfile>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM webhook_events
            WHERE outcome = 'deferred' AND owner_kind = $1 AND stripe_subscription_id = $2
            ORDER BY provider_created_at, received_at
            "#,
            SELECT_COLS
        ))
        .bind(kind.as_ref())
        .bind(stripe_subscription_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_profile).collect())
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM webhook_events WHERE received_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(result.rows_affected())
    }
}
