use std::sync::Arc;

use anyhow::Context;
use scenehub_api::config::AppConfig;
use scenehub_api::database::DatabaseManager;
use scenehub_api::integrations::IonClient;
use scenehub_api::{app, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let config = AppConfig::from_env();
    tracing::info!("Starting SceneHub API in {:?} mode", config.environment);

    if config.security.jwt_secret.is_empty() {
        tracing::error!("JWT_SECRET is not set; refusing to start");
        anyhow::bail!("JWT_SECRET must be set outside development");
    }
    if config.security.privileged_operators.is_empty() {
        tracing::warn!("PRIVILEGED_OPERATORS is empty; operator endpoints are unreachable");
    }

    let store = DatabaseManager::open_store(&config)
        .await
        .context("failed to open the store")?;
    let ion = IonClient::new(
        &config.integrations.cesium_ion_api_url,
        config.integrations.request_timeout_secs,
    )
    .context("failed to build the Cesium ion client")?;

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let state = AppState::new(store, config, Arc::new(ion));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("SceneHub API listening on http://{}", bind_addr);

    axum::serve(listener, app(state)).await.context("server error")?;
    Ok(())
}
