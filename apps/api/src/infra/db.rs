use std::time::Duration;

use sqlx::{Executor, PgPool, postgres::PgPoolOptions};
use tracing::info;

use super::InfraError;

pub struct DbSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub statement_timeout: Duration,
}

pub async fn init_db(database_url: &str, settings: &DbSettings) -> Result<PgPool, InfraError> {
    let statement_timeout_ms = settings.statement_timeout.as_millis();

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                conn.execute(format!("SET statement_timeout = {statement_timeout_ms}").as_str())
                    .await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
        .map_err(InfraError::DatabaseConnection)?;

    info!("Connected to database!");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(InfraError::Migration)?;
    info!("Database migrations applied");

    Ok(pool)
}
