//! geofeed-gateway server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use geofeed_gateway::api;
use geofeed_gateway::app_state::AppState;
use geofeed_gateway::config::{LogFormat, MarketConfig, StoreBackend};
use geofeed_gateway::domain::EventBus;
use geofeed_gateway::service::MarketService;
use geofeed_gateway::store::{InMemoryStore, PostgresStore, RecordStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = MarketConfig::from_env().context("loading configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    tracing::info!(
        addr = %config.listen_addr,
        backend = ?config.store_backend,
        "starting geofeed-gateway"
    );

    // Build record store
    let store: Arc<dyn RecordStore> = match config.store_backend {
        StoreBackend::Memory => Arc::new(InMemoryStore::with_change_capacity(
            config.store_change_capacity,
        )),
        StoreBackend::Postgres => Arc::new(
            PostgresStore::connect(&config.database, config.store_change_capacity)
                .await
                .context("connecting to postgres")?,
        ),
    };

    // Build service layer
    let market_service = MarketService::new(
        store,
        EventBus::new(config.event_bus_capacity),
        config.max_open_jobs,
    );

    // Build router
    let app = api::app(
        AppState::new(market_service),
        Duration::from_secs(config.request_timeout_secs),
    );

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
