use std::future::Future;
use std::time::Duration;

use crate::app_error::{AppError, AppResult};

pub mod billing_webhook;
pub mod entitlements;
pub mod plan_registry;
pub mod subscription_reconciler;
pub mod usage_meter;
pub mod webhook_verifier;

/// Default bound for a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Await a store call for at most `limit`, surfacing [`AppError::Timeout`]
/// instead of hanging the request.
pub(crate) async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = AppResult<T>>,
) -> AppResult<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout_ms = limit.as_millis() as u64, "Store call timed out");
            Err(AppError::Timeout)
        }
    }
}
