use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
};
use donelog_types::UsageMetric;
use serde::Deserialize;
use uuid::Uuid;

use super::parse_owner;
use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
};

#[derive(Debug, Deserialize)]
struct CorrectUsagePayload {
    count: u64,
}

fn parse_metric(metric: &str) -> AppResult<UsageMetric> {
    metric
        .parse()
        .map_err(|_| AppError::InvalidInput(format!("Unknown usage metric {metric:?}")))
}

/// GET /usage/{owner_kind}/{owner_id}/{metric}
async fn get_usage(
    State(app_state): State<AppState>,
    Path((owner_kind, owner_id, metric)): Path<(String, Uuid, String)>,
) -> AppResult<impl IntoResponse> {
    let owner = parse_owner(&owner_kind, owner_id)?;
    let snapshot = app_state
        .usage_meter
        .current(owner, parse_metric(&metric)?)
        .await?;
    Ok(Json(snapshot))
}

/// POST /usage/{owner_kind}/{owner_id}/{metric}/increment
async fn increment_usage(
    State(app_state): State<AppState>,
    Path((owner_kind, owner_id, metric)): Path<(String, Uuid, String)>,
) -> AppResult<impl IntoResponse> {
    let owner = parse_owner(&owner_kind, owner_id)?;
    let snapshot = app_state
        .usage_meter
        .increment(owner, parse_metric(&metric)?)
        .await?;
    Ok(Json(snapshot))
}

/// PUT /usage/{owner_kind}/{owner_id}/{metric}
async fn correct_usage(
    State(app_state): State<AppState>,
    Path((owner_kind, owner_id, metric)): Path<(String, Uuid, String)>,
    Json(payload): Json<CorrectUsagePayload>,
) -> AppResult<impl IntoResponse> {
    let owner = parse_owner(&owner_kind, owner_id)?;
    let snapshot = app_state
        .usage_meter
        .correct(owner, parse_metric(&metric)?, payload.count)
        .await?;
    Ok(Json(snapshot))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/usage/{owner_kind}/{owner_id}/{metric}",
            get(get_usage).put(correct_usage),
        )
        .route(
            "/usage/{owner_kind}/{owner_id}/{metric}/increment",
            post(increment_usage),
        )
}
