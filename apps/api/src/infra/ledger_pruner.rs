use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info};

use crate::use_cases::billing_webhook::BillingWebhookUseCases;

const PRUNE_INTERVAL_SECS: u64 = 3600;

/// Periodically delete idempotency-ledger rows older than the retention window.
pub async fn run_ledger_prune_loop(
    webhook_use_cases: Arc<BillingWebhookUseCases>,
    retention_days: i64,
) {
    let mut ticker = interval(Duration::from_secs(PRUNE_INTERVAL_SECS));
    let retention = chrono::Duration::days(retention_days);

    info!(
        retention_days,
        "Webhook ledger pruner started (every {}s)", PRUNE_INTERVAL_SECS
    );

    loop {
        ticker.tick().await;

        if let Err(e) = webhook_use_cases.prune_ledger(retention).await {
            error!(error = %e, "Failed to prune webhook ledger");
        }
    }
}
