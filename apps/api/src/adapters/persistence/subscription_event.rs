use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::subscription_reconciler::{
        CreateSubscriptionEventInput, SubscriptionEventRepoTrait,
    },
};

#[async_trait]
impl SubscriptionEventRepoTrait for PostgresPersistence {
    async fn create(&self, input: &CreateSubscriptionEventInput) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscription_events
                (id, owner_kind, subscription_id, event_type, previous_status, new_status,
                 stripe_event_id, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.owner_kind.as_ref())
        .bind(input.subscription_id)
        .bind(&input.event_type)
        .bind(input.previous_status.map(|s| s.to_string()))
        .bind(input.new_status.map(|s| s.to_string()))
        .bind(&input.stripe_event_id)
        .bind(&input.metadata)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }
}
