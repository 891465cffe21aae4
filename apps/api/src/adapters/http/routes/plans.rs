use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post, put},
};
use donelog_types::PlanFeatures;
use serde::Deserialize;
use validator::Validate;

use crate::{
    adapters::http::app_state::AppState,
    app_error::AppResult,
    application::use_cases::plan_registry::UpsertPlanInput,
};

#[derive(Debug, Deserialize, Validate)]
struct UpsertPlanPayload {
    #[validate(length(min = 1, max = 100, message = "Display name must be 1-100 characters"))]
    display_name: String,
    #[validate(range(min = 0, message = "Price cannot be negative"))]
    price_monthly_cents: i64,
    #[validate(range(min = 0, message = "Price cannot be negative"))]
    price_yearly_cents: i64,
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    currency: String,
    stripe_price_id_monthly: Option<String>,
    stripe_price_id_yearly: Option<String>,
    #[serde(default)]
    features: PlanFeatures,
    #[serde(default = "default_active")]
    is_active: bool,
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_active() -> bool {
    true
}

/// GET /plans
async fn list_plans(State(app_state): State<AppState>) -> AppResult<impl IntoResponse> {
    let plans = app_state.plan_registry.list_public().await?;
    Ok(Json(plans))
}

/// PUT /plans/{name}
async fn upsert_plan(
    State(app_state): State<AppState>,
    Path(name): Path<String>,
    Json(payload): Json<UpsertPlanPayload>,
) -> AppResult<impl IntoResponse> {
    payload.validate()?;
    let input = UpsertPlanInput {
        name,
        display_name: payload.display_name,
        price_monthly_cents: payload.price_monthly_cents,
        price_yearly_cents: payload.price_yearly_cents,
        currency: payload.currency,
        stripe_price_id_monthly: payload.stripe_price_id_monthly.filter(|s| !s.is_empty()),
        stripe_price_id_yearly: payload.stripe_price_id_yearly.filter(|s| !s.is_empty()),
        features: payload.features,
        is_active: payload.is_active,
    };
    let plan = app_state.plan_registry.upsert(&input).await?;
    Ok(Json(plan))
}

/// POST /plans/{name}/deactivate
async fn deactivate_plan(
    State(app_state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<impl IntoResponse> {
    let plan = app_state.plan_registry.deactivate(&name).await?;
    Ok(Json(plan))
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/plans", get(list_plans))
}

pub fn internal_router() -> Router<AppState> {
    Router::new()
        .route("/plans/{name}", put(upsert_plan))
        .route("/plans/{name}/deactivate", post(deactivate_plan))
}
