use anyhow::Context;
use tracing_subscriber::EnvFilter;

use aqua_api::config::config;
use aqua_api::database::DatabaseManager;
use aqua_api::handlers::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, DATABASE_NAME, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Initialize configuration (this loads the config singleton)
    let config = config();
    tracing::info!("Starting Aqua API in {:?} mode", config.environment);

    let connector = DatabaseManager::connector().await.context("failed to configure database pool")?;
    if let Err(e) = DatabaseManager::health_check().await {
        // lazy pool: requests reconnect on demand
        tracing::warn!("Database not reachable at startup: {}", e);
    }
    let app = router(AppState::new(connector));

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Aqua API listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")?;

    DatabaseManager::close().await;
    Ok(())
}
