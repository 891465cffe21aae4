use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
};
use donelog_types::{FeatureKey, GateDecision};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::parse_owner;
use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
};

#[derive(Debug, Deserialize)]
struct CheckFeaturePayload {
    feature: String,
    current_usage: Option<u64>,
}

#[derive(Debug, Serialize)]
struct CheckFeatureResponse {
    feature: FeatureKey,
    allowed: bool,
    #[serde(flatten)]
    decision: GateDecision,
}

/// GET /entitlements/{owner_kind}/{owner_id}
async fn get_entitlements(
    State(app_state): State<AppState>,
    Path((owner_kind, owner_id)): Path<(String, Uuid)>,
) -> AppResult<impl IntoResponse> {
    let owner = parse_owner(&owner_kind, owner_id)?;
    let entitlements = app_state.entitlement_use_cases.get(owner).await?;
    Ok(Json(entitlements))
}

/// POST /entitlements/{owner_kind}/{owner_id}/check
///
/// 200 when allowed (possibly with a warning), 402 when an upgrade is required.
async fn check_feature(
    State(app_state): State<AppState>,
    Path((owner_kind, owner_id)): Path<(String, Uuid)>,
    Json(payload): Json<CheckFeaturePayload>,
) -> AppResult<impl IntoResponse> {
    let owner = parse_owner(&owner_kind, owner_id)?;
    let feature = FeatureKey::parse(&payload.feature)
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;

    let decision = app_state
        .entitlement_use_cases
        .check(owner, feature, payload.current_usage)
        .await?;

    Ok(Json(CheckFeatureResponse {
        feature,
        allowed: decision.is_allowed(),
        decision,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/entitlements/{owner_kind}/{owner_id}", get(get_entitlements))
        .route("/entitlements/{owner_kind}/{owner_id}/check", post(check_feature))
}
