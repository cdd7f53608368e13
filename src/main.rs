//! Libportal - Library portal backend

use anyhow::Result;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use libportal::{
    api::{self, AppState},
    config::Config,
    portal::Portal,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "libportal=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting library portal...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    config.validate()?;
    tracing::info!("Configuration loaded, backend: {}", config.backend.origin);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let cors_origin = config.server.cors_origin.clone();

    // Build the portal and pick up a persisted session
    let portal = Portal::from_config(config)?;
    let status = portal.restore().await;
    tracing::info!("Session restored: {:?}", status.state);

    // Build router
    let app = api::build_router(AppState::new(portal), &cors_origin);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
