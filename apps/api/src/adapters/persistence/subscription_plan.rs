use async_trait::async_trait;
use donelog_types::{FeatureKey, PlanFeatures};
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::{PostgresPersistence, parse_json_with_fallback},
    app_error::{AppError, AppResult},
    application::use_cases::plan_registry::{SubscriptionPlanRepoTrait, UpsertPlanInput},
    domain::entities::plan::PlanProfile,
};

/// Decode a stored feature map.
///
/// Unknown keys are dropped with a warning. A value of the wrong type leaves
/// the whole map empty, so a corrupt plan denies rather than grants.
pub(crate) fn load_plan_features(json: &serde_json::Value, plan_name: &str) -> PlanFeatures {
    if let Some(map) = json.as_object() {
        for key in map.keys() {
            if FeatureKey::parse(key).is_err() {
                tracing::warn!(
                    plan = plan_name,
                    feature_key = %key,
                    "Ignoring unknown feature key in plan"
                );
            }
        }
    }
    parse_json_with_fallback(json, "features", "subscription_plan", plan_name)
}

fn row_to_profile(row: sqlx::postgres::PgRow) -> PlanProfile {
    let name: String = row.get("name");
    let features_json: serde_json::Value = row.get("features");
    let features = load_plan_features(&features_json, &name);

    PlanProfile {
        id: row.get("id"),
        name,
        display_name: row.get("display_name"),
        price_monthly_cents: row.get("price_monthly_cents"),
        price_yearly_cents: row.get("price_yearly_cents"),
        currency: row.get("currency"),
        stripe_price_id_monthly: row.get("stripe_price_id_monthly"),
        stripe_price_id_yearly: row.get("stripe_price_id_yearly"),
        features,
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, name, display_name, price_monthly_cents, price_yearly_cents, currency,
    stripe_price_id_monthly, stripe_price_id_yearly, features, is_active,
    created_at, updated_at
"#;

#[async_trait]
impl SubscriptionPlanRepoTrait for PostgresPersistence {
    async fn get_by_name(&self, name: &str) -> AppResult<Option<PlanProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscription_plans WHERE name = $1",
            SELECT_COLS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_profile))
    }

    async fn get_by_stripe_price_id(&self, price_id: &str) -> AppResult<Option<PlanProfile>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM subscription_plans
            WHERE stripe_price_id_monthly = $1 OR stripe_price_id_yearly = $1
            ORDER BY is_active DESC, created_at
            LIMIT 1
            "#,
            SELECT_COLS
        ))
        .bind(price_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_profile))
    }

    async fn list_active(&self) -> AppResult<Vec<PlanProfile>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM subscription_plans WHERE is_active = true ORDER BY price_monthly_cents, name",
            SELECT_COLS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(rows.into_iter().map(row_to_profile).collect())
    }

    async fn upsert(&self, input: &UpsertPlanInput) -> AppResult<PlanProfile> {
        let features_json = serde_json::to_value(&input.features)
            .map_err(|e| AppError::Internal(format!("Failed to encode features: {}", e)))?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO subscription_plans
                (id, name, display_name, price_monthly_cents, price_yearly_cents, currency,
                 stripe_price_id_monthly, stripe_price_id_yearly, features, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (name) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                price_monthly_cents = EXCLUDED.price_monthly_cents,
                price_yearly_cents = EXCLUDED.price_yearly_cents,
                currency = EXCLUDED.currency,
                stripe_price_id_monthly = EXCLUDED.stripe_price_id_monthly,
                stripe_price_id_yearly = EXCLUDED.stripe_price_id_yearly,
                features = EXCLUDED.features,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.display_name)
        .bind(input.price_monthly_cents)
        .bind(input.price_yearly_cents)
        .bind(&input.currency)
        .bind(&input.stripe_price_id_monthly)
        .bind(&input.stripe_price_id_yearly)
        .bind(&features_json)
        .bind(input.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(row_to_profile(row))
    }

    async fn set_active(&self, name: &str, is_active: bool) -> AppResult<Option<PlanProfile>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE subscription_plans
            SET is_active = $2, updated_at = NOW()
            WHERE name = $1
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(name)
        .bind(is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_profile))
    }
}
