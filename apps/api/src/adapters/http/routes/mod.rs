pub mod billing_webhooks;
pub mod entitlements;
pub mod health;
pub mod plans;
pub mod usage;

use axum::{Router, middleware};
use donelog_types::{Owner, OwnerKind};
use uuid::Uuid;

use crate::{
    adapters::http::{app_state::AppState, middleware::require_internal_token},
    app_error::{AppError, AppResult},
};

/// Public routes (provider webhooks, catalog) plus the internal API the
/// application calls with its bearer token. Both share one path space; only
/// the internal routes carry the token layer.
pub fn router(app_state: AppState) -> Router<AppState> {
    let internal = Router::new()
        .merge(plans::internal_router())
        .merge(entitlements::router())
        .merge(usage::router())
        .route_layer(middleware::from_fn_with_state(
            app_state,
            require_internal_token,
        ));

    Router::new()
        .merge(health::router())
        .merge(billing_webhooks::router())
        .merge(plans::public_router())
        .merge(internal)
}

pub(crate) fn parse_owner(kind: &str, id: Uuid) -> AppResult<Owner> {
    let kind: OwnerKind = kind
        .parse()
        .map_err(|_| AppError::InvalidInput(format!("Unknown owner kind {kind:?}")))?;
    Ok(Owner { kind, id })
}
