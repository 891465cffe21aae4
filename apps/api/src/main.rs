use std::sync::Arc;

use dotenvy::dotenv;
use tracing::info;

use donelog_api::infra::{
    app::create_app, config::AppConfig, ledger_pruner::run_ledger_prune_loop,
    setup::{init_app_state, init_tracing},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = AppConfig::from_env()?;
    init_tracing(config.log_format);

    let bind_addr = config.bind_addr;
    let retention_days = config.webhook_event_retention_days;
    let app_state = init_app_state(config).await?;

    let webhook_use_cases = Arc::clone(&app_state.webhook_use_cases);
    tokio::spawn(async move {
        run_ledger_prune_loop(webhook_use_cases, retention_days).await;
    });

    let app = create_app(app_state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Backend listening at {}", &listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
