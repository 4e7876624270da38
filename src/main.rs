use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use trendspot_backend::config::AppConfig;
use trendspot_backend::routes;
use trendspot_backend::services::gemini::GeminiClient;
use trendspot_backend::services::storage::StorageService;
use trendspot_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Ok(path) = dotenv {
        tracing::info!("Loaded environment from {}", path.display());
    }

    let config = AppConfig::load().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded (env: {})", std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into()));

    if config.gemini.api_key().is_none() && config.gemini.access_token().is_none() {
        tracing::warn!("No Gemini credentials configured; extractions will fail");
    }

    let extractor = GeminiClient::new(&config.gemini).context("Failed to create Gemini client")?;
    let reports = StorageService::new(&config.storage);

    tracing::info!(
        model = %config.gemini.model,
        bucket = %config.storage.bucket_name,
        folder = %config.storage.reports_folder,
        "Collaborators ready"
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, Arc::new(extractor), Arc::new(reports));
    let app = routes::router(state);

    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
