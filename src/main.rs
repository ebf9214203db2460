use anyhow::{Context, Result};
use std::net::SocketAddr;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pixel_tracker::api::create_router;
use pixel_tracker::auth::ApiSecretGuard;
use pixel_tracker::config::Config;
use pixel_tracker::storage;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Storage is a hard requirement: never accept traffic without it
    let storage = storage::connect(&config.database).await?;

    info!("Initializing database...");
    storage.init().await.context("database initialization failed")?;
    storage.ping().await.context("database health check failed")?;
    info!("Database initialized successfully");

    let app = create_router(
        std::sync::Arc::clone(&storage),
        ApiSecretGuard::new(config.auth.api_secret.clone()),
        config.visits.clone(),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Pixel tracker listening on http://{}", addr);

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    storage.close().await;
    info!("Storage closed");

    if let Err(e) = served {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
