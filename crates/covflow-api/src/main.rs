//! Covflow API server entry point.

use std::sync::Arc;

use covflow_api::bus::TracingEventBus;
use covflow_api::config::AppConfig;
use covflow_api::error::AppError;
use covflow_api::state::AppState;
use covflow_core::clock::SystemClock;
use covflow_event_store::pg_state_change_store::PgStateChangeStore;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Covflow API server");

    let config = AppConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    let store = Arc::new(PgStateChangeStore::new(pool, Arc::new(SystemClock)));
    store.ensure_schema().await?;
    spawn_expiry_purge(Arc::clone(&store), config.expiry_purge_interval);

    let app_state = AppState::new(
        Arc::new(SystemClock),
        store,
        Arc::new(TracingEventBus),
        config.conflict_retry_limit,
    );
    let app = covflow_api::app(app_state);

    tracing::info!("Listening on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Deletes expired state changes every `period` for the life of the process.
fn spawn_expiry_purge(store: Arc<PgStateChangeStore>, period: std::time::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            if let Err(e) = store.purge_expired().await {
                tracing::warn!(error = %e, "failed to purge expired state changes");
            }
        }
    });
}
