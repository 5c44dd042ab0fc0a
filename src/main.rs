mod api;
mod app;
mod config;
mod domain;
mod error;
mod logging;
mod middleware;
mod routes;
mod services;

use anyhow::Result;
use std::sync::Arc;

use services::{AiClient, JsonFileSnapshot, ProjectStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration; a missing AI credential stops startup here
    let settings = config::Settings::from_env()?;

    // Initialize logging
    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        data_file = %settings.data_file.display(),
        "Starting takeoff backend"
    );

    // Restore projects from the snapshot
    let store = ProjectStore::open(Arc::new(JsonFileSnapshot::new(&settings.data_file)));

    // Create AI service client
    let ai_client = AiClient::new(&settings)?;
    tracing::info!(
        model = %ai_client.model_name(),
        max_attempts = settings.ai_max_attempts,
        "AI client initialized"
    );

    // Create application state
    let state = app::AppState::new(settings.clone(), store, ai_client);

    // Build application
    let app = app::create_app(state.clone());

    // Start server
    let listener = tokio::net::TcpListener::bind(&settings.server_addr).await?;
    tracing::info!("Listening on {}", settings.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Every mutation is already persisted; this is a final flush
    state.store.persist()?;
    tracing::info!("Project store flushed, shutting down");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
