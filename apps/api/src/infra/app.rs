use axum::{Router, http};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::adapters::{self, http::app_state::AppState};

pub fn create_app(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(app_state.config.cors_origin.clone())
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::PUT])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    Router::new()
        .nest("/api", adapters::http::routes::router(app_state.clone()))
        .with_state(app_state)
        .layer(cors)
        .layer(SetResponseHeaderLayer::if_not_present(
            http::header::X_CONTENT_TYPE_OPTIONS,
            http::HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            http::header::X_FRAME_OPTIONS,
            http::HeaderValue::from_static("DENY"),
        ))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &http::Request<_>| {
                let request_id = Uuid::new_v4();
                tracing::info_span!(
                    "http-request",
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                    request_id = %request_id
                )
            }),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::TestServer;

    use crate::test_utils::{TEST_INTERNAL_TOKEN, TestAppStateBuilder};
    use serde_json::json;

    #[tokio::test]
    async fn test_routes_are_nested_under_api_with_security_headers() {
        let harness = TestAppStateBuilder::new().build();
        let server = TestServer::new(create_app(harness.app_state)).unwrap();

        let response = server.get("/api/health").await;
        response.assert_status_ok();
        assert_eq!(response.header("x-content-type-options"), "nosniff");
        assert_eq!(response.header("x-frame-options"), "DENY");

        server
            .get("/health")
            .await
            .assert_status(http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_internal_api_is_served_at_documented_paths() {
        let harness = TestAppStateBuilder::new().build();
        let server = TestServer::new(create_app(harness.app_state)).unwrap();
        let bearer = format!("Bearer {TEST_INTERNAL_TOKEN}");
        let owner_id = Uuid::new_v4();

        let response = server
            .get(&format!("/api/entitlements/user/{owner_id}"))
            .add_header("Authorization", bearer.clone())
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<serde_json::Value>()["plan"], "free");

        server
            .get(&format!("/api/usage/user/{owner_id}/messages"))
            .add_header("Authorization", bearer.clone())
            .await
            .assert_status_ok();

        server
            .put("/api/plans/plus")
            .add_header("Authorization", bearer.clone())
            .json(&json!({
                "display_name": "Plus",
                "price_monthly_cents": 500,
                "price_yearly_cents": 5000
            }))
            .await
            .assert_status_ok();

        server
            .put("/api/plans/plus")
            .json(&json!({
                "display_name": "Plus",
                "price_monthly_cents": 500,
                "price_yearly_cents": 5000
            }))
            .await
            .assert_status(http::StatusCode::UNAUTHORIZED);

        server
            .get(&format!("/api/internal/entitlements/user/{owner_id}"))
            .add_header("Authorization", bearer)
            .await
            .assert_status(http::StatusCode::NOT_FOUND);
    }
}
