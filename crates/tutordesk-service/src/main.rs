//! Tutordesk Service - HTTP API for the tutoring back office
//!
//! This is the main entry point for the tutordesk service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tutordesk_service::{create_router, AppState, ServiceConfig};
use tutordesk_store::PgStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tutordesk=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Tutordesk Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        meeting_api_configured = %config.meeting_api_base_url.is_some(),
        notify_configured = %config.notify_url.is_some(),
        "Service configuration loaded"
    );

    // Connect to PostgreSQL and apply pending migrations
    let store = PgStore::connect(&config.database_url, config.max_db_connections).await?;
    store.run_migrations().await?;
    tracing::info!("Database ready");

    // Build app state
    let state = AppState::new(Arc::new(store), config.clone());

    // Create the router
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
