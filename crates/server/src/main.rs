//! Walletsync development server binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use walletsync_server::{app, config::ServerConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "walletsync_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    let state = AppState::from_config(&config).await;

    tracing::info!("Starting server on {}", config.bind);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}
