//! Billing provider webhook endpoints.
//!
//! `POST /billing/webhook` receives user subscription events and
//! `POST /teams/billing/webhook` team events. The raw body is verified
//! before anything else touches it.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::json;
use tracing::error;

use crate::{
    adapters::http::app_state::AppState,
    app_error::AppError,
    application::use_cases::billing_webhook::{WebhookIngress, is_retryable_error},
};

const SIGNATURE_HEADER: &str = "stripe-signature";

/// POST /billing/webhook
async fn user_webhook(State(app_state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    handle_webhook(&app_state, WebhookIngress::User, &headers, &body).await
}

/// POST /teams/billing/webhook
async fn team_webhook(State(app_state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    handle_webhook(&app_state, WebhookIngress::Team, &headers, &body).await
}

async fn handle_webhook(
    app_state: &AppState,
    ingress: WebhookIngress,
    headers: &HeaderMap,
    body: &[u8],
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match app_state
        .webhook_use_cases
        .handle(ingress, signature, body)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(json!({ "received": true }))).into_response(),
        Err(AppError::InvalidSignature) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid signature" })),
        )
            .into_response(),
        Err(e) => {
            error!(
                error = %e,
                ingress = %ingress,
                retryable = is_retryable_error(&e),
                "Webhook processing failed, returning 500 for provider retry"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Webhook processing failed" })),
            )
                .into_response()
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/billing/webhook", post(user_webhook))
        .route("/teams/billing/webhook", post(team_webhook))
}
